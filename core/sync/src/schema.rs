//! Declarative attribute schema.
//!
//! The registry is built once and shared read-only by the engine. It maps
//! each entity type to the attributes it carries, their data types, and
//! which of them reference media assets or related entities.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use campussync_common::{EntityType, Error, Result};

/// Taxonomy carried by colleges.
pub const COLLEGE_STREAM_TAXONOMY: &str = "college_stream";

/// Facility attributes of a college, all rich text.
const COLLEGE_FACILITIES: [&str; 16] = [
    "_college_facility_description",
    "_college_facility_boys_hostel",
    "_college_facility_girls_hostel",
    "_college_facility_medical_hospital",
    "_college_facility_gym",
    "_college_facility_library",
    "_college_facility_sports",
    "_college_facility_it_infrastructure",
    "_college_facility_cafeteria",
    "_college_facility_auditorium",
    "_college_facility_transport_facility",
    "_college_facility_alumni_associations",
    "_college_facility_wifi",
    "_college_facility_laboratories",
    "_college_facility_guest_room",
    "_college_facility_training_placement_cell",
];

/// Data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Non-negative integer.
    Integer,
    /// Plain text; markup is stripped.
    Text,
    /// Rich text; a safe HTML subset is kept.
    RichText,
    /// List of non-negative integers.
    IntegerList,
    /// List of plain-text strings.
    TextList,
    /// List of department records.
    RecordList,
}

impl FieldType {
    /// Value stored or exported when the attribute is absent.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::Integer => json!(0),
            FieldType::Text | FieldType::RichText => json!(""),
            FieldType::IntegerList | FieldType::TextList | FieldType::RecordList => json!([]),
        }
    }

    /// Whether the attribute stores a list.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            FieldType::IntegerList | FieldType::TextList | FieldType::RecordList
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldType::Integer => "integer",
            FieldType::Text => "string",
            FieldType::RichText => "string (HTML)",
            FieldType::IntegerList => "list<integer>",
            FieldType::TextList => "list<string>",
            FieldType::RecordList => "list<{name, ownership, courses}>",
        };
        f.write_str(label)
    }
}

/// The far side of a relationship attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Key under `relations` in import payloads.
    pub payload_key: &'static str,
    /// Type of the related entities.
    pub related: EntityType,
    /// Attribute on the related type that mirrors this one.
    pub reciprocal_key: &'static str,
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Attribute key.
    pub key: &'static str,
    /// Data type.
    pub field_type: FieldType,
    /// Values are media asset identifiers.
    pub attachment: bool,
    /// Set for relationship attributes.
    pub relation: Option<Relation>,
}

impl FieldSpec {
    fn new(key: &'static str, field_type: FieldType) -> Self {
        Self {
            key,
            field_type,
            attachment: false,
            relation: None,
        }
    }

    fn attachment(mut self) -> Self {
        self.attachment = true;
        self
    }

    fn related(
        mut self,
        payload_key: &'static str,
        related: EntityType,
        reciprocal_key: &'static str,
    ) -> Self {
        self.relation = Some(Relation {
            payload_key,
            related,
            reciprocal_key,
        });
        self
    }
}

/// Immutable table of attribute declarations per entity type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    fields: BTreeMap<EntityType, Vec<FieldSpec>>,
    taxonomies: BTreeMap<EntityType, Vec<&'static str>>,
}

impl SchemaRegistry {
    /// Build a registry from explicit tables.
    ///
    /// # Errors
    /// - A relationship names a reciprocal attribute that is not declared
    ///   as a relationship pointing back
    pub fn from_tables(
        fields: BTreeMap<EntityType, Vec<FieldSpec>>,
        taxonomies: BTreeMap<EntityType, Vec<&'static str>>,
    ) -> Result<Self> {
        let registry = Self { fields, taxonomies };
        registry.check_reciprocals()?;
        Ok(registry)
    }

    /// The schema for colleges, courses, exams and streams.
    pub fn standard() -> Self {
        let mut college = vec![
            FieldSpec::new("_college_logo", FieldType::Integer).attachment(),
            FieldSpec::new("_college_website_url", FieldType::Text),
            FieldSpec::new("_college_established_year", FieldType::Integer),
            FieldSpec::new("_college_gallery", FieldType::IntegerList).attachment(),
            FieldSpec::new("_college_fee_min", FieldType::Text),
            FieldSpec::new("_college_fee_max", FieldType::Text),
            FieldSpec::new("_college_location", FieldType::Text),
            FieldSpec::new("_college_pincode", FieldType::Text),
            FieldSpec::new("_college_state", FieldType::Text),
            FieldSpec::new("_college_country", FieldType::Text),
            FieldSpec::new("_college_address_line", FieldType::Text),
            FieldSpec::new("_college_is_university", FieldType::Text),
            FieldSpec::new("_college_fees_info", FieldType::RichText),
            FieldSpec::new("_college_admission_info", FieldType::RichText),
            FieldSpec::new("_college_placement_info", FieldType::RichText),
        ];
        college.extend(
            COLLEGE_FACILITIES
                .into_iter()
                .map(|key| FieldSpec::new(key, FieldType::RichText)),
        );
        college.push(FieldSpec::new(
            "_college_university_departments",
            FieldType::RecordList,
        ));
        college.push(
            FieldSpec::new("_linked_courses", FieldType::IntegerList).related(
                "linked_courses",
                EntityType::Course,
                "_linked_colleges",
            ),
        );

        let course = vec![FieldSpec::new("_linked_colleges", FieldType::IntegerList).related(
            "linked_colleges",
            EntityType::College,
            "_linked_courses",
        )];
        let exam = vec![FieldSpec::new("_linked_streams", FieldType::IntegerList).related(
            "linked_streams",
            EntityType::Stream,
            "_linked_exams",
        )];
        let stream = vec![FieldSpec::new("_linked_exams", FieldType::IntegerList).related(
            "linked_exams",
            EntityType::Exam,
            "_linked_streams",
        )];

        Self {
            fields: BTreeMap::from([
                (EntityType::College, college),
                (EntityType::Course, course),
                (EntityType::Exam, exam),
                (EntityType::Stream, stream),
            ]),
            taxonomies: BTreeMap::from([(EntityType::College, vec![COLLEGE_STREAM_TAXONOMY])]),
        }
    }

    /// Every attribute declared for `entity_type`, in declaration order.
    pub fn fields(&self, entity_type: EntityType) -> &[FieldSpec] {
        self.fields
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up one attribute declaration.
    pub fn field(&self, entity_type: EntityType, key: &str) -> Option<&FieldSpec> {
        self.fields(entity_type).iter().find(|f| f.key == key)
    }

    /// Attributes whose values are media asset identifiers.
    pub fn attachments(&self, entity_type: EntityType) -> impl Iterator<Item = &FieldSpec> {
        self.fields(entity_type).iter().filter(|f| f.attachment)
    }

    /// Relationship attributes with their relation descriptors.
    pub fn relations(
        &self,
        entity_type: EntityType,
    ) -> impl Iterator<Item = (&FieldSpec, &Relation)> {
        self.fields(entity_type)
            .iter()
            .filter_map(|f| f.relation.as_ref().map(|r| (f, r)))
    }

    /// Taxonomies whose terms can be assigned to `entity_type`.
    pub fn taxonomies(&self, entity_type: EntityType) -> &[&'static str] {
        self.taxonomies
            .get(&entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn check_reciprocals(&self) -> Result<()> {
        for (entity_type, fields) in &self.fields {
            for field in fields {
                let Some(relation) = &field.relation else {
                    continue;
                };
                let back = self
                    .field(relation.related, relation.reciprocal_key)
                    .and_then(|f| f.relation.as_ref());
                match back {
                    Some(back)
                        if back.related == *entity_type && back.reciprocal_key == field.key => {}
                    _ => {
                        return Err(Error::InvalidInput(format!(
                            "Relation {}.{} has no matching reciprocal {}.{}",
                            entity_type, field.key, relation.related, relation.reciprocal_key
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}
