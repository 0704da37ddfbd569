//! Schema-aware flattening of namespace-qualified XML messages.
//!
//! Two wire schemas are supported:
//!
//! - **Signal** messages: an envelope of scalar groups plus exactly one reading
//!   collection of name/value(/unit) entries. One message yields one record.
//! - **Component** messages: document-level scalars plus a collection of
//!   recursively nested components. One message yields one record per node.
//!
//! Any structure the schema does not describe is rejected with a
//! [`FlattenError`]; nothing is silently dropped.

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Namespace of signal (sensor reading) messages
pub const SIGNAL_NAMESPACE: &str = "http://uptake.com/bhp/1/sensors";
/// Namespace of vehicle component messages
pub const COMPONENT_NAMESPACE: &str = "http://www.uptake.com/bhp/1/vehicleComponent";

/// Closing tag that terminates each signal document inside a compacted file
pub const SIGNAL_END_TAG: &str = "</NS1:message>";
/// Closing tag that terminates each component document inside a compacted file
pub const COMPONENT_END_TAG: &str = "</NS1:vehicleComponent>";

/// Column holding the back-reference to the enclosing component's code
pub const PARENT_CODE: &str = "parent_code";
/// Suffix appended to a reading name for its unit-of-measure column
pub const UOM_SUFFIX: &str = "_UoM";

const READING_COLLECTION: &str = "readingCollection";
const COMPONENT_COLLECTION: &str = "componentCollection";
const SUBCOMPONENT_COLLECTION: &str = "subcomponentCollection";
const COMPONENT_ATTRIBUTE_COLLECTION: &str = "componentAttributeCollection";
const COMPONENT_CODE: &str = "componentCode";
const ATTRIBUTE_NAME: &str = "attributeName";
const ATTRIBUTE_VALUE: &str = "attributeValue";
const ATTRIBUTE_UOM: &str = "attributeUoM";

/// Schema violations raised while flattening a single message
#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unknown collection of elements: {tag}")]
    UnknownCollection { tag: String },

    #[error("Unknown reading attribute: {tag}: {text:?}")]
    UnknownReadingAttribute { tag: String, text: Option<String> },

    #[error("Unknown attribute structure in {tag}: {children} child elements")]
    UnknownAttributeStructure { tag: String, children: usize },

    #[error("Missing attributeName in {tag}")]
    MissingAttributeName { tag: String },
}

/// Raw decoded text of one XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlMessage(String);

impl XmlMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for XmlMessage {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for XmlMessage {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// One flat row: field name to scalar value, in first-insertion order.
///
/// Setting a key that already exists replaces its value but keeps its
/// position, so column order stays stable across records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRecord {
    fields: Vec<(String, Option<String>)>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field
    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Value of a field: `None` if the key is absent, `Some(None)` if it is null
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Layer `overlay` on top of `self`; overlay values win on shared keys
    pub fn merged_with(&self, overlay: FlatRecord) -> FlatRecord {
        let mut merged = self.clone();
        for (key, value) in overlay.fields {
            merged.set(key, value);
        }
        merged
    }
}

/// Category of reading, which decides the wire schema of its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingCategory {
    /// Time-series sensor readings
    Signal,
    /// Hierarchical equipment-component manifests
    Component,
}

/// Flattener for one of the supported message schemas.
///
/// Resolved once when a pipeline is built, then applied to every message.
#[derive(Debug, Clone)]
pub enum RecordFlattener {
    Signal(SignalFlattener),
    Component(ComponentFlattener),
}

impl RecordFlattener {
    /// Build the default flattener for a reading category
    pub fn for_category(category: ReadingCategory) -> Self {
        match category {
            ReadingCategory::Signal => RecordFlattener::Signal(SignalFlattener::default()),
            ReadingCategory::Component => {
                RecordFlattener::Component(ComponentFlattener::default())
            }
        }
    }

    pub fn category(&self) -> ReadingCategory {
        match self {
            RecordFlattener::Signal(_) => ReadingCategory::Signal,
            RecordFlattener::Component(_) => ReadingCategory::Component,
        }
    }

    /// Closing tag of one document of this schema
    pub fn end_tag(&self) -> &'static str {
        match self {
            RecordFlattener::Signal(_) => SIGNAL_END_TAG,
            RecordFlattener::Component(_) => COMPONENT_END_TAG,
        }
    }

    /// Flatten one message into its records
    pub fn flatten(&self, message: &XmlMessage) -> Result<Vec<FlatRecord>, FlattenError> {
        match self {
            RecordFlattener::Signal(flattener) => flattener.flatten(message),
            RecordFlattener::Component(flattener) => flattener.flatten(message),
        }
    }

    /// Split a compacted file into the individual documents it holds
    pub fn split_compacted(&self, content: &str) -> Vec<XmlMessage> {
        split_compacted(content, self.end_tag())
    }

    /// Flatten every document of every compacted file, in order
    pub fn flatten_compacted<S: AsRef<str>>(
        &self,
        contents: &[S],
    ) -> Result<Vec<FlatRecord>, FlattenError> {
        let mut records = Vec::new();
        for content in contents {
            for message in self.split_compacted(content.as_ref()) {
                records.extend(self.flatten(&message)?);
            }
        }
        Ok(records)
    }
}

/// Split concatenated documents on `end_tag`.
///
/// Whitespace-only fragments are dropped; every other fragment is trimmed and
/// gets its closing tag back.
pub fn split_compacted(content: &str, end_tag: &str) -> Vec<XmlMessage> {
    content
        .split(end_tag)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| XmlMessage::new(format!("{fragment}\n{end_tag}")))
        .collect()
}

/// Flattener for sensor signal messages
#[derive(Debug, Clone)]
pub struct SignalFlattener {
    namespace: String,
}

impl Default for SignalFlattener {
    fn default() -> Self {
        Self::new(SIGNAL_NAMESPACE)
    }
}

impl SignalFlattener {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Flatten a signal message into exactly one record
    pub fn flatten(&self, message: &XmlMessage) -> Result<Vec<FlatRecord>, FlattenError> {
        let doc = Document::parse(message.as_str())?;
        let mut record = FlatRecord::new();

        for group in element_children(doc.root_element()) {
            for element in element_children(group) {
                if is_tag(element, &self.namespace, READING_COLLECTION) {
                    for reading in element_children(element) {
                        self.flatten_reading(reading, &mut record)?;
                    }
                } else {
                    if has_element_children(element) {
                        return Err(FlattenError::UnknownCollection {
                            tag: clark_name(element),
                        });
                    }
                    record.set(column_name(element, &self.namespace), text_of(element));
                }
            }
        }

        trace!(fields = record.len(), "Flattened signal message");
        Ok(vec![record])
    }

    fn flatten_reading(&self, reading: Node, record: &mut FlatRecord) -> Result<(), FlattenError> {
        let mut name = None;
        let mut value = None;
        let mut uom = None;

        for attribute in element_children(reading) {
            if is_tag(attribute, &self.namespace, ATTRIBUTE_NAME) {
                name = text_of(attribute);
            } else if is_tag(attribute, &self.namespace, ATTRIBUTE_VALUE) {
                value = text_of(attribute);
            } else if is_tag(attribute, &self.namespace, ATTRIBUTE_UOM) {
                uom = text_of(attribute);
            } else {
                return Err(FlattenError::UnknownReadingAttribute {
                    tag: clark_name(attribute),
                    text: text_of(attribute),
                });
            }
        }

        let name = name.ok_or_else(|| FlattenError::MissingAttributeName {
            tag: clark_name(reading),
        })?;

        // A unit column only exists next to its reading column.
        if let Some(uom) = uom {
            record.set(name.clone(), value);
            record.set(format!("{name}{UOM_SUFFIX}"), Some(uom));
        } else {
            record.set(name, value);
        }

        Ok(())
    }
}

/// Flattener for hierarchical vehicle component messages
#[derive(Debug, Clone)]
pub struct ComponentFlattener {
    namespace: String,
}

impl Default for ComponentFlattener {
    fn default() -> Self {
        Self::new(COMPONENT_NAMESPACE)
    }
}

impl ComponentFlattener {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Flatten a component message into one record per component node.
    ///
    /// Document-level scalars are merged into every record. A node's record
    /// follows the records of its subcomponents.
    pub fn flatten(&self, message: &XmlMessage) -> Result<Vec<FlatRecord>, FlattenError> {
        let doc = Document::parse(message.as_str())?;
        let mut document_attributes = FlatRecord::new();
        let mut records = Vec::new();

        for element in element_children(doc.root_element()) {
            if has_element_children(element) {
                if !is_tag(element, &self.namespace, COMPONENT_COLLECTION) {
                    return Err(FlattenError::UnknownCollection {
                        tag: clark_name(element),
                    });
                }
                for component in element_children(element) {
                    records.extend(self.flatten_component(component, None)?);
                }
            } else {
                document_attributes.set(column_name(element, &self.namespace), text_of(element));
            }
        }

        trace!(records = records.len(), "Flattened component message");
        Ok(records
            .into_iter()
            .map(|record| document_attributes.merged_with(record))
            .collect())
    }

    fn flatten_component(
        &self,
        component: Node,
        parent_code: Option<&str>,
    ) -> Result<Vec<FlatRecord>, FlattenError> {
        let component_code = element_children(component)
            .find(|child| is_tag(*child, &self.namespace, COMPONENT_CODE))
            .and_then(text_of);

        let mut record = FlatRecord::new();
        let mut records = Vec::new();

        for element in element_children(component) {
            if is_tag(element, &self.namespace, SUBCOMPONENT_COLLECTION) {
                for subcomponent in element_children(element) {
                    records.extend(
                        self.flatten_component(subcomponent, component_code.as_deref())?,
                    );
                }
            } else if is_tag(element, &self.namespace, COMPONENT_ATTRIBUTE_COLLECTION) {
                for entry in element_children(element) {
                    self.flatten_attribute(entry, &mut record)?;
                }
            } else {
                if has_element_children(element) {
                    return Err(FlattenError::UnknownCollection {
                        tag: clark_name(element),
                    });
                }
                record.set(column_name(element, &self.namespace), text_of(element));
            }
        }

        record.set(PARENT_CODE, parent_code.map(str::to_string));
        records.push(record);
        Ok(records)
    }

    fn flatten_attribute(&self, entry: Node, record: &mut FlatRecord) -> Result<(), FlattenError> {
        let children = element_children(entry).count();
        if children != 1 && children != 2 {
            return Err(FlattenError::UnknownAttributeStructure {
                tag: clark_name(entry),
                children,
            });
        }

        let name = self
            .child_text(entry, ATTRIBUTE_NAME)
            .flatten()
            .ok_or_else(|| FlattenError::MissingAttributeName {
                tag: clark_name(entry),
            })?;

        if children == 1 {
            record.set(name, None);
            return Ok(());
        }

        let value = self.child_text(entry, ATTRIBUTE_VALUE).ok_or_else(|| {
            FlattenError::UnknownAttributeStructure {
                tag: clark_name(entry),
                children,
            }
        })?;
        record.set(name, value);
        Ok(())
    }

    /// Text of the first child with the given local name: `None` if there is
    /// no such child, `Some(None)` if it has no text.
    fn child_text(&self, node: Node, local: &str) -> Option<Option<String>> {
        element_children(node)
            .find(|child| is_tag(*child, &self.namespace, local))
            .map(text_of)
    }
}

fn element_children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn has_element_children(node: Node) -> bool {
    node.children().any(|child| child.is_element())
}

fn is_tag(node: Node, namespace: &str, local: &str) -> bool {
    let tag = node.tag_name();
    tag.namespace() == Some(namespace) && tag.name() == local
}

/// Column name of a scalar element: the bare local name inside the schema's
/// namespace, Clark notation (`{ns}name`) outside it.
fn column_name(node: Node, namespace: &str) -> String {
    let tag = node.tag_name();
    match tag.namespace() {
        Some(ns) if ns == namespace => tag.name().to_string(),
        _ => clark_name(node),
    }
}

fn clark_name(node: Node) -> String {
    let tag = node.tag_name();
    match tag.namespace() {
        Some(ns) => format!("{{{ns}}}{}", tag.name()),
        None => tag.name().to_string(),
    }
}

fn text_of(node: Node) -> Option<String> {
    node.text().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNAL: &str = r#"<NS1:message xmlns:NS1="http://uptake.com/bhp/1/sensors">
  <NS1:messageHeader>
    <NS1:messageId>7f1c</NS1:messageId>
    <NS1:sourceSystem>RailBAM</NS1:sourceSystem>
  </NS1:messageHeader>
  <NS1:messagePayload>
    <NS1:vehicleIdentifier>WAG-1042</NS1:vehicleIdentifier>
    <NS1:typeOfReading>ACOUSTIC</NS1:typeOfReading>
    <NS1:readingLocation/>
    <NS1:readingCollection>
      <NS1:reading>
        <NS1:attributeName>RMSTotalDB</NS1:attributeName>
        <NS1:attributeValue>71.2</NS1:attributeValue>
        <NS1:attributeUoM>dB</NS1:attributeUoM>
      </NS1:reading>
      <NS1:reading>
        <NS1:attributeName>SiteName</NS1:attributeName>
        <NS1:attributeValue>Yandi</NS1:attributeValue>
      </NS1:reading>
    </NS1:readingCollection>
  </NS1:messagePayload>
</NS1:message>"#;

    const COMPONENT: &str = r#"<NS1:vehicleComponent xmlns:NS1="http://www.uptake.com/bhp/1/vehicleComponent">
  <NS1:vehicleIdentifier>WAG-1042</NS1:vehicleIdentifier>
  <NS1:componentCollection>
    <NS1:component>
      <NS1:componentCode>BOGIE-1</NS1:componentCode>
      <NS1:componentType>Bogie</NS1:componentType>
      <NS1:componentAttributeCollection>
        <NS1:componentAttribute>
          <NS1:attributeName>serial</NS1:attributeName>
          <NS1:attributeValue>SN-9</NS1:attributeValue>
        </NS1:componentAttribute>
        <NS1:componentAttribute>
          <NS1:attributeName>note</NS1:attributeName>
        </NS1:componentAttribute>
      </NS1:componentAttributeCollection>
      <NS1:subcomponentCollection>
        <NS1:component>
          <NS1:componentCode>AXLE-1</NS1:componentCode>
        </NS1:component>
      </NS1:subcomponentCollection>
    </NS1:component>
  </NS1:componentCollection>
</NS1:vehicleComponent>"#;

    #[test]
    fn test_signal_record_fields_in_document_order() {
        let records = SignalFlattener::default()
            .flatten(&XmlMessage::from(SIGNAL))
            .unwrap();

        assert_eq!(records.len(), 1);
        let keys: Vec<_> = records[0].keys().collect();
        assert_eq!(
            keys,
            vec![
                "messageId",
                "sourceSystem",
                "vehicleIdentifier",
                "typeOfReading",
                "readingLocation",
                "RMSTotalDB",
                "RMSTotalDB_UoM",
                "SiteName",
            ]
        );
        assert_eq!(records[0].get("RMSTotalDB_UoM"), Some(Some("dB")));
        assert_eq!(records[0].get("readingLocation"), Some(None));
        assert!(!records[0].contains_key("SiteName_UoM"));
    }

    #[test]
    fn test_signal_unknown_reading_attribute() {
        let xml = SIGNAL.replace("NS1:attributeUoM", "NS1:attributeUnit");
        let err = SignalFlattener::default()
            .flatten(&XmlMessage::from(xml))
            .unwrap_err();

        match err {
            FlattenError::UnknownReadingAttribute { tag, text } => {
                assert!(tag.ends_with("attributeUnit"));
                assert_eq!(text.as_deref(), Some("dB"));
            }
            other => panic!("Expected UnknownReadingAttribute, got {other:?}"),
        }
    }

    #[test]
    fn test_signal_nested_group_outside_reading_collection() {
        let xml = SIGNAL.replace(
            "<NS1:readingLocation/>",
            "<NS1:readingLocation><NS1:lat>1</NS1:lat></NS1:readingLocation>",
        );
        let err = SignalFlattener::default()
            .flatten(&XmlMessage::from(xml))
            .unwrap_err();

        assert!(matches!(err, FlattenError::UnknownCollection { .. }));
    }

    #[test]
    fn test_foreign_namespace_scalar_keeps_clark_name() {
        let xml = SIGNAL.replace(
            "<NS1:readingLocation/>",
            r#"<x:site xmlns:x="urn:other">Yandi</x:site>"#,
        );
        let records = SignalFlattener::default()
            .flatten(&XmlMessage::from(xml))
            .unwrap();

        assert_eq!(records[0].get("{urn:other}site"), Some(Some("Yandi")));
    }

    #[test]
    fn test_component_post_order_with_parent_codes() {
        let records = ComponentFlattener::default()
            .flatten(&XmlMessage::from(COMPONENT))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("componentCode"), Some(Some("AXLE-1")));
        assert_eq!(records[0].get(PARENT_CODE), Some(Some("BOGIE-1")));
        assert_eq!(records[1].get("componentCode"), Some(Some("BOGIE-1")));
        assert_eq!(records[1].get(PARENT_CODE), Some(None));

        // Document scalars lead every record
        for record in &records {
            assert_eq!(record.keys().next(), Some("vehicleIdentifier"));
        }
    }

    const COMPONENT_TREE: &str = r#"<NS1:vehicleComponent xmlns:NS1="http://www.uptake.com/bhp/1/vehicleComponent">
  <NS1:vehicleIdentifier>WAG-2001</NS1:vehicleIdentifier>
  <NS1:componentCollection>
    <NS1:component>
      <NS1:componentCode>WAGON-1</NS1:componentCode>
      <NS1:subcomponentCollection>
        <NS1:component>
          <NS1:componentCode>BOGIE-A</NS1:componentCode>
          <NS1:subcomponentCollection>
            <NS1:component><NS1:componentCode>AXLE-A1</NS1:componentCode></NS1:component>
            <NS1:component><NS1:componentCode>AXLE-A2</NS1:componentCode></NS1:component>
          </NS1:subcomponentCollection>
        </NS1:component>
        <NS1:component>
          <NS1:componentType>Frame</NS1:componentType>
          <NS1:subcomponentCollection>
            <NS1:component>
              <NS1:componentCode>BOLT-1</NS1:componentCode>
              <NS1:subcomponentCollection>
                <NS1:component><NS1:componentCode>NUT-1</NS1:componentCode></NS1:component>
              </NS1:subcomponentCollection>
            </NS1:component>
          </NS1:subcomponentCollection>
        </NS1:component>
      </NS1:subcomponentCollection>
    </NS1:component>
    <NS1:component>
      <NS1:componentCode>COUPLER-1</NS1:componentCode>
    </NS1:component>
  </NS1:componentCollection>
</NS1:vehicleComponent>"#;

    #[test]
    fn test_component_tree_post_order_across_subtrees() {
        let records = ComponentFlattener::default()
            .flatten(&XmlMessage::from(COMPONENT_TREE))
            .unwrap();

        let nodes: Vec<_> = records
            .iter()
            .map(|record| {
                let name = record
                    .get("componentCode")
                    .or_else(|| record.get("componentType"))
                    .flatten();
                (name, record.get(PARENT_CODE).flatten())
            })
            .collect();

        assert_eq!(
            nodes,
            vec![
                (Some("AXLE-A1"), Some("BOGIE-A")),
                (Some("AXLE-A2"), Some("BOGIE-A")),
                (Some("BOGIE-A"), Some("WAGON-1")),
                (Some("NUT-1"), Some("BOLT-1")),
                // Parent has no componentCode
                (Some("BOLT-1"), None),
                (Some("Frame"), Some("WAGON-1")),
                (Some("WAGON-1"), None),
                (Some("COUPLER-1"), None),
            ]
        );

        for record in &records {
            assert_eq!(record.get("vehicleIdentifier"), Some(Some("WAG-2001")));
            assert!(record.get(PARENT_CODE).is_some());
        }
    }

    #[test]
    fn test_component_attribute_collection_values() {
        let records = ComponentFlattener::default()
            .flatten(&XmlMessage::from(COMPONENT))
            .unwrap();

        let bogie = &records[1];
        assert_eq!(bogie.get("serial"), Some(Some("SN-9")));
        assert_eq!(bogie.get("note"), Some(None));
        assert_eq!(bogie.get("componentType"), Some(Some("Bogie")));
    }

    #[test]
    fn test_component_attribute_with_three_children() {
        let xml = COMPONENT.replace(
            "<NS1:attributeValue>SN-9</NS1:attributeValue>",
            "<NS1:attributeValue>SN-9</NS1:attributeValue><NS1:attributeUoM>x</NS1:attributeUoM>",
        );
        let err = ComponentFlattener::default()
            .flatten(&XmlMessage::from(xml))
            .unwrap_err();

        assert!(matches!(
            err,
            FlattenError::UnknownAttributeStructure { children: 3, .. }
        ));
    }

    #[test]
    fn test_component_unknown_document_collection() {
        let xml = COMPONENT.replace("componentCollection", "partsCollection");
        let err = ComponentFlattener::default()
            .flatten(&XmlMessage::from(xml))
            .unwrap_err();

        assert!(matches!(err, FlattenError::UnknownCollection { .. }));
    }

    #[test]
    fn test_malformed_xml() {
        let err = SignalFlattener::default()
            .flatten(&XmlMessage::from("<NS1:message"))
            .unwrap_err();
        assert!(matches!(err, FlattenError::Xml(_)));
    }

    #[test]
    fn test_split_compacted_restores_end_tags() {
        let content = format!("{SIGNAL}\n{SIGNAL}\n  \n");
        let messages = split_compacted(&content, SIGNAL_END_TAG);

        assert_eq!(messages.len(), 2);
        for message in &messages {
            assert!(message.as_str().ends_with("\n</NS1:message>"));
            assert!(message.as_str().starts_with("<NS1:message"));
        }
    }

    #[test]
    fn test_flatten_compacted_concatenates_files() {
        let flattener = RecordFlattener::for_category(ReadingCategory::Signal);
        let files = vec![format!("{SIGNAL}{SIGNAL}"), SIGNAL.to_string()];

        let records = flattener.flatten_compacted(&files).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let flattener = RecordFlattener::for_category(ReadingCategory::Component);
        let message = XmlMessage::from(COMPONENT);

        assert_eq!(
            flattener.flatten(&message).unwrap(),
            flattener.flatten(&message).unwrap()
        );
    }

    #[test]
    fn test_flat_record_set_keeps_position() {
        let mut record = FlatRecord::new();
        record.set("a", Some("1".to_string()));
        record.set("b", None);
        record.set("a", Some("2".to_string()));

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(Some("2")));
    }
}
