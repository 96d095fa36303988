// src/core/import.rs

//! XML object importer.
//!
//! Reads a stream of `<class>` definitions and `<object>` instances and
//! turns the instances into CCB create operations, so an import passes
//! through exactly the validation a live configuration change would.
//! Attribute values are typed by the class declarations; opaque values use
//! base-64 (`xsi:type="xs:base64Binary"`). Re-importing the same file is a
//! no-op through the attribute-identical create path.

use crate::core::errors::{AmfError, AmfResult};
use crate::core::imm::ccb::CcbOp;
use crate::core::imm::store::ObjClass;
use crate::core::model::attr::{AttrType, AttrValue, Attribute};
use crate::core::model::dn::Dn;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

fn obj_class_of(name: &str) -> Option<ObjClass> {
    Some(match name {
        "SaAmfCluster" => ObjClass::Cluster,
        "SaAmfNode" => ObjClass::Node,
        "SaAmfNodeGroup" => ObjClass::NodeGroup,
        "SaAmfApplication" => ObjClass::App,
        "SaAmfAppType" => ObjClass::AppType,
        "SaAmfSG" => ObjClass::Sg,
        "SaAmfSGType" => ObjClass::SgType,
        "SaAmfSU" => ObjClass::Su,
        "SaAmfSUType" => ObjClass::SuType,
        "SaAmfSI" => ObjClass::Si,
        "SaAmfSvcType" => ObjClass::SvcType,
        "SaAmfCSI" => ObjClass::Csi,
        "SaAmfCSType" => ObjClass::CsType,
        "SaAmfComp" => ObjClass::Comp,
        "SaAmfCompType" => ObjClass::CompType,
        "SaAmfCSIAttribute" => ObjClass::CsiAttribute,
        "SaAmfSIDependency" => ObjClass::SiDependency,
        "SaAmfSIRankedSU" => ObjClass::SiRankedSu,
        "SaAmfCompGlobalAttributes" => ObjClass::GlobalAttributes,
        "OpenSafLogConfig" => ObjClass::LogConfig,
        "SaLogStreamConfig" => ObjClass::LogStream,
        _ => return None,
    })
}

/// Attribute type declarations per class, collected from `<class>` blocks.
type ClassDecls = HashMap<String, HashMap<String, AttrType>>;

#[derive(Default)]
struct ParserState {
    decls: ClassDecls,
    // <class> being declared
    cur_class: Option<String>,
    cur_class_attr: Option<String>,
    cur_class_attr_type: Option<AttrType>,
    // <object> being read
    cur_obj_class: Option<String>,
    cur_obj_dn: Option<String>,
    cur_obj_attrs: Vec<Attribute>,
    // <attr> of the current object
    cur_attr_name: Option<String>,
    cur_attr_values: Vec<String>,
    cur_value_is_b64: bool,
    // element text accumulator
    text: String,
}

/// Parses an XML document into CCB create operations, in file order.
pub fn parse_str(input: &str) -> AmfResult<Vec<CcbOp>> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);
    let mut state = ParserState::default();
    let mut ops: Vec<CcbOp> = Vec::new();
    let mut seen: Vec<Dn> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| AmfError::InvalidParam(format!("XML parse error: {e}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    "class" => {
                        let cname = attr_of(&e, "name")?.ok_or_else(|| {
                            AmfError::InvalidParam("<class> without a name".to_string())
                        })?;
                        state.decls.entry(cname.clone()).or_default();
                        state.cur_class = Some(cname);
                    }
                    "object" => {
                        let cname = attr_of(&e, "class")?.ok_or_else(|| {
                            AmfError::InvalidParam("<object> without a class".to_string())
                        })?;
                        if obj_class_of(&cname).is_none() {
                            return Err(AmfError::InvalidParam(format!(
                                "unknown class '{cname}'"
                            )));
                        }
                        state.cur_obj_class = Some(cname);
                        state.cur_obj_dn = None;
                        state.cur_obj_attrs.clear();
                    }
                    "attr" => {
                        state.cur_attr_name = None;
                        state.cur_attr_values.clear();
                        state.cur_class_attr = None;
                        state.cur_class_attr_type = None;
                    }
                    "rdn" => {
                        // Class RDN declarations carry no value typing we
                        // need; the object's <dn> is authoritative.
                    }
                    "value" | "default-value" => {
                        state.cur_value_is_b64 = attr_of(&e, "xsi:type")?
                            .map(|t| t == "xs:base64Binary")
                            .unwrap_or(false);
                        state.text.clear();
                    }
                    "name" | "type" | "dn" | "category" | "flag" => {
                        state.text.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                let piece = t
                    .unescape()
                    .map_err(|e| AmfError::InvalidParam(format!("XML text error: {e}")))?;
                state.text.push_str(&piece);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                end_element(&name, &mut state, &mut ops, &mut seen)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    debug!(objects = ops.len(), "XML import parsed");
    Ok(ops)
}

pub fn parse_file(path: &str) -> AmfResult<Vec<CcbOp>> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

fn attr_of(e: &quick_xml::events::BytesStart<'_>, want: &str) -> AmfResult<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(|e| AmfError::InvalidParam(format!("bad XML attribute: {e}")))?;
        if String::from_utf8_lossy(a.key.as_ref()) == want {
            let v = a
                .unescape_value()
                .map_err(|e| AmfError::InvalidParam(format!("bad XML attribute value: {e}")))?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn end_element(
    name: &str,
    state: &mut ParserState,
    ops: &mut Vec<CcbOp>,
    seen: &mut Vec<Dn>,
) -> AmfResult<()> {
    match name {
        "name" => {
            let text = std::mem::take(&mut state.text);
            if state.cur_obj_class.is_some() {
                state.cur_attr_name = Some(text);
            } else if state.cur_class.is_some() {
                state.cur_class_attr = Some(text);
            }
        }
        "type" => {
            let text = std::mem::take(&mut state.text);
            if state.cur_class.is_some() {
                state.cur_class_attr_type = Some(AttrType::from_str(&text).map_err(|_| {
                    AmfError::InvalidParam(format!("unknown attribute type '{text}'"))
                })?);
            }
        }
        "dn" => {
            state.cur_obj_dn = Some(std::mem::take(&mut state.text));
        }
        "value" | "default-value" => {
            let raw = std::mem::take(&mut state.text);
            let value = if state.cur_value_is_b64 {
                let bytes = BASE64.decode(raw.trim()).map_err(|e| {
                    AmfError::InvalidParam(format!("bad base64 value: {e}"))
                })?;
                String::from_utf8(bytes)?
            } else {
                raw
            };
            if state.cur_obj_class.is_some() {
                state.cur_attr_values.push(value);
            }
        }
        "attr" => {
            if let Some(class) = state.cur_class.clone() {
                // Record the declared type for later objects.
                if let (Some(attr), Some(ty)) =
                    (state.cur_class_attr.take(), state.cur_class_attr_type.take())
                {
                    state.decls.entry(class).or_default().insert(attr, ty);
                }
            } else if state.cur_obj_class.is_some() {
                let Some(attr_name) = state.cur_attr_name.take() else {
                    return Err(AmfError::InvalidParam(
                        "object <attr> without a <name>".to_string(),
                    ));
                };
                let class = state.cur_obj_class.as_ref().unwrap();
                let ty = state
                    .decls
                    .get(class)
                    .and_then(|d| d.get(&attr_name))
                    .copied()
                    .unwrap_or(AttrType::Str);
                let values = std::mem::take(&mut state.cur_attr_values)
                    .into_iter()
                    .map(|v| AttrValue::parse(ty, &v))
                    .collect::<AmfResult<Vec<_>>>()?;
                state.cur_obj_attrs.push(Attribute {
                    name: attr_name,
                    values,
                });
            }
        }
        "class" => {
            state.cur_class = None;
        }
        "object" => {
            let class_name = state.cur_obj_class.take().ok_or_else(|| {
                AmfError::InvalidParam("</object> without <object>".to_string())
            })?;
            let class = obj_class_of(&class_name)
                .ok_or_else(|| AmfError::InvalidParam(format!("unknown class '{class_name}'")))?;
            let dn_text = state.cur_obj_dn.take().ok_or_else(|| {
                AmfError::InvalidParam(format!("object of class '{class_name}' without a DN"))
            })?;
            let dn = Dn::new(dn_text)?;
            if seen.contains(&dn) {
                return Err(AmfError::Exist(format!("duplicate object '{dn}' in file")));
            }
            seen.push(dn.clone());
            ops.push(CcbOp::create(
                class,
                dn,
                std::mem::take(&mut state.cur_obj_attrs),
            ));
        }
        _ => {}
    }
    Ok(())
}
