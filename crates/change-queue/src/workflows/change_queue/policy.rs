use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{EntityType, FieldPath, FieldValue};

/// Approval tier an item needs before it may be approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Standard,
    Elevated,
}

/// Value shape accepted by a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "options", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Email,
    Date,
    Boolean,
    Integer,
    Choice(Vec<String>),
}

impl FieldType {
    pub fn label(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Choice(_) => "choice",
        }
    }

    /// Whether the value variant matches this field's shape. Format checks
    /// (email shape, choice membership) are left to validation.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldType::Text | FieldType::Email | FieldType::Choice(_), FieldValue::Text(_))
                | (FieldType::Date, FieldValue::Date(_))
                | (FieldType::Boolean, FieldValue::Boolean(_))
                | (FieldType::Integer, FieldValue::Integer(_))
        )
    }
}

/// Schema and approval policy for one field path of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPolicy {
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub is_sevis_related: bool,
    pub required_approval_level: ApprovalLevel,
}

impl FieldPolicy {
    pub fn standard(label: &str, field_type: FieldType) -> Self {
        Self {
            label: label.to_string(),
            field_type,
            required: false,
            is_sevis_related: false,
            required_approval_level: ApprovalLevel::Standard,
        }
    }

    /// SEVIS-reported fields always need the elevated approval tier.
    pub fn sevis(label: &str, field_type: FieldType) -> Self {
        Self {
            is_sevis_related: true,
            required_approval_level: ApprovalLevel::Elevated,
            ..Self::standard(label, field_type)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Read-only lookup of field legality and approval policy.
pub trait PolicyTable: Send + Sync {
    fn lookup(&self, entity_type: EntityType, field_path: &FieldPath) -> Option<FieldPolicy>;

    /// Every known field of an entity type, ordered by path.
    fn fields(&self, entity_type: EntityType) -> Vec<(FieldPath, FieldPolicy)>;
}

/// Static table backing the exchange-program record schema.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyTable {
    entries: BTreeMap<(EntityType, FieldPath), FieldPolicy>,
}

impl StaticPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        entity_type: EntityType,
        path: &str,
        policy: FieldPolicy,
    ) -> Self {
        self.entries
            .insert((entity_type, FieldPath::new(path)), policy);
        self
    }

    /// Field schema for students, host families, and coordinators.
    pub fn standard() -> Self {
        use EntityType::{Coordinator, HostFamily, Student};
        use FieldType::{Boolean, Date, Email, Integer, Text};

        let us_states = || {
            FieldType::Choice(
                [
                    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID",
                    "IL", "IN", "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO",
                    "MT", "NE", "NV", "NH", "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA",
                    "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV", "WI", "WY",
                ]
                .iter()
                .map(|state| state.to_string())
                .collect(),
            )
        };
        let program_status = FieldType::Choice(
            ["initial", "active", "completed", "terminated"]
                .iter()
                .map(|status| status.to_string())
                .collect(),
        );

        Self::new()
            .with_field(Student, "first_name", FieldPolicy::sevis("First Name", Text).required())
            .with_field(Student, "last_name", FieldPolicy::sevis("Last Name", Text).required())
            .with_field(Student, "preferred_name", FieldPolicy::standard("Preferred Name", Text))
            .with_field(
                Student,
                "date_of_birth",
                FieldPolicy::sevis("Date of Birth", Date).required(),
            )
            .with_field(Student, "email", FieldPolicy::standard("Email", Email))
            .with_field(Student, "phone", FieldPolicy::standard("Phone", Text))
            .with_field(Student, "address.street", FieldPolicy::sevis("Street Address", Text))
            .with_field(Student, "address.city", FieldPolicy::sevis("City", Text))
            .with_field(Student, "address.state", FieldPolicy::sevis("State", us_states()))
            .with_field(Student, "address.postal_code", FieldPolicy::sevis("Postal Code", Text))
            .with_field(Student, "school.name", FieldPolicy::sevis("School", Text))
            .with_field(Student, "program.start_date", FieldPolicy::sevis("Program Start", Date))
            .with_field(Student, "program.end_date", FieldPolicy::sevis("Program End", Date))
            .with_field(
                Student,
                "program.status",
                FieldPolicy::sevis("Program Status", program_status),
            )
            .with_field(Student, "host_family_id", FieldPolicy::sevis("Host Family", Text))
            .with_field(Student, "coordinator_id", FieldPolicy::standard("Coordinator", Text))
            .with_field(Student, "dietary_notes", FieldPolicy::standard("Dietary Notes", Text))
            .with_field(
                HostFamily,
                "family_name",
                FieldPolicy::standard("Family Name", Text).required(),
            )
            .with_field(HostFamily, "email", FieldPolicy::standard("Email", Email))
            .with_field(HostFamily, "phone", FieldPolicy::standard("Phone", Text))
            .with_field(HostFamily, "address.street", FieldPolicy::standard("Street Address", Text))
            .with_field(HostFamily, "address.city", FieldPolicy::standard("City", Text))
            .with_field(HostFamily, "address.state", FieldPolicy::standard("State", us_states()))
            .with_field(
                HostFamily,
                "address.postal_code",
                FieldPolicy::standard("Postal Code", Text),
            )
            .with_field(
                HostFamily,
                "bedrooms_available",
                FieldPolicy::standard("Bedrooms Available", Integer),
            )
            .with_field(HostFamily, "has_pets", FieldPolicy::standard("Has Pets", Boolean))
            .with_field(
                HostFamily,
                "background_check_date",
                FieldPolicy::standard("Background Check", Date),
            )
            .with_field(HostFamily, "coordinator_id", FieldPolicy::standard("Coordinator", Text))
            .with_field(
                Coordinator,
                "full_name",
                FieldPolicy::standard("Full Name", Text).required(),
            )
            .with_field(Coordinator, "email", FieldPolicy::standard("Email", Email).required())
            .with_field(Coordinator, "phone", FieldPolicy::standard("Phone", Text))
            .with_field(Coordinator, "region", FieldPolicy::standard("Region", Text))
            .with_field(Coordinator, "max_students", FieldPolicy::standard("Max Students", Integer))
            .with_field(Coordinator, "active", FieldPolicy::standard("Active", Boolean))
    }
}

impl PolicyTable for StaticPolicyTable {
    fn lookup(&self, entity_type: EntityType, field_path: &FieldPath) -> Option<FieldPolicy> {
        self.entries
            .get(&(entity_type, field_path.clone()))
            .cloned()
    }

    fn fields(&self, entity_type: EntityType) -> Vec<(FieldPath, FieldPolicy)> {
        self.entries
            .iter()
            .filter(|((kind, _), _)| *kind == entity_type)
            .map(|((_, path), policy)| (path.clone(), policy.clone()))
            .collect()
    }
}
