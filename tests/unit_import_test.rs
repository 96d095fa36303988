use amfd::config::CompGlobalConfig;
use amfd::core::errors::AmfError;
use amfd::core::imm::ccb;
use amfd::core::imm::store::{ObjClass, ObjectStore};
use amfd::core::import;
use amfd::core::model::Model;
use amfd::core::model::attr::AttrValue;

const MODEL_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<imm:IMM-contents xmlns:imm="http://www.saforum.org/IMMSchema">
  <class name="SaAmfNode">
    <rdn name="safAmfNode" type="SA_NAME_T"/>
    <attr>
      <name>saAmfNodeSuFailoverMax</name>
      <type>SA_UINT32_T</type>
    </attr>
    <attr>
      <name>saAmfNodeAutoRepair</name>
      <type>SA_UINT32_T</type>
    </attr>
  </class>
  <class name="SaAmfSG">
    <rdn name="safSg" type="SA_NAME_T"/>
    <attr>
      <name>saAmfSGRedundancyModel</name>
      <type>SA_STRING_T</type>
    </attr>
  </class>
  <object class="SaAmfCluster">
    <dn>safAmfCluster=myAmfCluster</dn>
  </object>
  <object class="SaAmfNode">
    <dn>safAmfNode=PL-3,safAmfCluster=myAmfCluster</dn>
    <attr>
      <name>saAmfNodeSuFailoverMax</name>
      <value>7</value>
    </attr>
    <attr>
      <name>saAmfNodeAutoRepair</name>
      <value>1</value>
    </attr>
  </object>
  <object class="SaAmfApplication">
    <dn>safApp=App1</dn>
  </object>
  <object class="SaAmfSG">
    <dn>safSg=SG1,safApp=App1</dn>
    <attr>
      <name>saAmfSGRedundancyModel</name>
      <value>TWO-N</value>
    </attr>
  </object>
</imm:IMM-contents>
"#;

#[test]
fn test_parse_typed_objects() {
    let ops = import::parse_str(MODEL_XML).unwrap();
    assert_eq!(ops.len(), 4);
    let node = ops.iter().find(|o| o.class == ObjClass::Node).unwrap();
    let failover_max = node
        .attrs
        .iter()
        .find(|a| a.name == "saAmfNodeSuFailoverMax")
        .unwrap();
    // The class declaration types the value as UINT32, not a string.
    assert_eq!(failover_max.values, vec![AttrValue::Uint32(7)]);
}

#[test]
fn test_import_then_reimport_is_noop() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let globals = CompGlobalConfig::default();

    let ops = import::parse_str(MODEL_XML).unwrap();
    ccb::ccb_completed(1, &model, &store, &globals, &ops).unwrap();
    ccb::ccb_apply(1, &mut model, &store, &globals, ops).unwrap();
    assert_eq!(model.nodes.len(), 1);
    assert_eq!(model.sgs.len(), 1);
    let objects_before = store.len();

    // Re-importing the same file takes the attribute-identical path.
    let ops = import::parse_str(MODEL_XML).unwrap();
    ccb::ccb_completed(2, &model, &store, &globals, &ops).unwrap();
    ccb::ccb_apply(2, &mut model, &store, &globals, ops).unwrap();
    assert_eq!(store.len(), objects_before);
    assert_eq!(model.nodes.len(), 1);
}

#[test]
fn test_unknown_class_is_rejected() {
    let xml = r#"<doc><object class="SaAmfWormhole"><dn>safX=1</dn></object></doc>"#;
    let err = import::parse_str(xml).unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
}

#[test]
fn test_duplicate_dn_is_rejected() {
    let xml = r#"<doc>
      <object class="SaAmfApplication"><dn>safApp=App1</dn></object>
      <object class="SaAmfApplication"><dn>safApp=App1</dn></object>
    </doc>"#;
    let err = import::parse_str(xml).unwrap_err();
    assert!(matches!(err, AmfError::Exist(_)));
}

#[test]
fn test_oversized_dn_is_rejected() {
    let long = "x".repeat(300);
    let xml = format!(
        r#"<doc><object class="SaAmfApplication"><dn>safApp={long}</dn></object></doc>"#
    );
    let err = import::parse_str(&xml).unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
}

#[test]
fn test_base64_opaque_values() {
    let xml = r#"<doc>
      <class name="SaAmfApplication">
        <rdn name="safApp" type="SA_NAME_T"/>
        <attr><name>blob</name><type>SA_ANY_T</type></attr>
      </class>
      <object class="SaAmfApplication">
        <dn>safApp=App1</dn>
        <attr><name>blob</name><value xsi:type="xs:base64Binary">aGVsbG8=</value></attr>
      </object>
    </doc>"#;
    let ops = import::parse_str(xml).unwrap();
    let blob = ops[0].attrs.iter().find(|a| a.name == "blob").unwrap();
    assert_eq!(blob.values, vec![AttrValue::Opaque(b"hello".to_vec())]);
}
