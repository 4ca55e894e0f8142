use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::domain::{ChangeKind, ChangeSubmission, EntityFields, FieldPath, FieldValue};
use super::policy::{ApprovalLevel, FieldType, PolicyTable};

/// Rule broken by one part of a submission or decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    EmptyBatch,
    UnknownEntity,
    UnknownField,
    DuplicateFieldPath { conflicting_items: Vec<usize> },
    TypeMismatch { expected: &'static str, found: &'static str },
    InvalidFormat { detail: String },
    BlankValue,
    RequiredField,
    NothingToDelete,
    NoChange,
    EmptyRejectionReason,
    BlankComment,
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::EmptyBatch => write!(f, "submission contains no changes"),
            ValidationRule::UnknownEntity => write!(f, "entity does not exist"),
            ValidationRule::UnknownField => write!(f, "field is not part of the entity schema"),
            ValidationRule::DuplicateFieldPath { conflicting_items } => {
                let others: Vec<String> = conflicting_items
                    .iter()
                    .map(|index| index.to_string())
                    .collect();
                write!(f, "field path also proposed by item(s) {}", others.join(", "))
            }
            ValidationRule::TypeMismatch { expected, found } => {
                write!(f, "expected a {expected} value, found {found}")
            }
            ValidationRule::InvalidFormat { detail } => write!(f, "invalid format: {detail}"),
            ValidationRule::BlankValue => write!(f, "text value must not be blank"),
            ValidationRule::RequiredField => write!(f, "required field cannot be deleted"),
            ValidationRule::NothingToDelete => write!(f, "field has no value to delete"),
            ValidationRule::NoChange => write!(f, "new value matches the current value"),
            ValidationRule::EmptyRejectionReason => {
                write!(f, "rejection requires a non-empty reason")
            }
            ValidationRule::BlankComment => write!(f, "comment content must not be blank"),
        }
    }
}

/// A single offending input, pointing at the batch position and field when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_path: Option<FieldPath>,
    #[serde(flatten)]
    pub rule: ValidationRule,
}

impl ValidationIssue {
    pub fn general(rule: ValidationRule) -> Self {
        Self {
            item_index: None,
            field_path: None,
            rule,
        }
    }

    fn item(index: usize, field_path: &FieldPath, rule: ValidationRule) -> Self {
        Self {
            item_index: Some(index),
            field_path: Some(field_path.clone()),
            rule,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.item_index, &self.field_path) {
            (Some(index), Some(path)) => write!(f, "item {index} ({path}): {}", self.rule),
            (_, Some(path)) => write!(f, "{path}: {}", self.rule),
            _ => write!(f, "{}", self.rule),
        }
    }
}

/// Every issue found in one pass; callers can fix the whole batch at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("validation failed: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(rule: ValidationRule) -> Self {
        Self {
            issues: vec![ValidationIssue::general(rule)],
        }
    }

    /// Issues attached to a given batch position.
    pub fn for_item(&self, index: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.item_index == Some(index))
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Submission item after schema and policy checks, ready to become a change item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedChange {
    pub field_path: FieldPath,
    pub field_label: String,
    pub previous_value: FieldValue,
    pub new_value: FieldValue,
    pub change_kind: ChangeKind,
    pub is_sevis_related: bool,
    pub required_approval_level: ApprovalLevel,
}

/// Checks a submission against the entity schema held by the policy table.
pub struct SubmissionValidator<'a> {
    policy: &'a dyn PolicyTable,
}

impl<'a> SubmissionValidator<'a> {
    pub fn new(policy: &'a dyn PolicyTable) -> Self {
        Self { policy }
    }

    /// Validate the whole batch. `current` is `None` when the entity does not exist.
    pub fn validate(
        &self,
        submission: &ChangeSubmission,
        current: Option<&EntityFields>,
    ) -> Result<Vec<ValidatedChange>, ValidationError> {
        let mut issues = Vec::new();

        if submission.items.is_empty() {
            issues.push(ValidationIssue::general(ValidationRule::EmptyBatch));
        }
        if current.is_none() {
            issues.push(ValidationIssue::general(ValidationRule::UnknownEntity));
        }

        let mut positions: BTreeMap<&FieldPath, Vec<usize>> = BTreeMap::new();
        for (index, proposed) in submission.items.iter().enumerate() {
            positions
                .entry(&proposed.field_path)
                .or_default()
                .push(index);
        }
        for (path, indexes) in &positions {
            if indexes.len() < 2 {
                continue;
            }
            for &index in indexes {
                let conflicting_items = indexes
                    .iter()
                    .copied()
                    .filter(|other| *other != index)
                    .collect();
                issues.push(ValidationIssue::item(
                    index,
                    path,
                    ValidationRule::DuplicateFieldPath { conflicting_items },
                ));
            }
        }

        let mut validated = Vec::with_capacity(submission.items.len());
        for (index, proposed) in submission.items.iter().enumerate() {
            let path = &proposed.field_path;
            let Some(policy) = self.policy.lookup(submission.entity_type, path) else {
                issues.push(ValidationIssue::item(index, path, ValidationRule::UnknownField));
                continue;
            };

            let mut item_ok = true;
            let mut flag = |rule: ValidationRule| {
                issues.push(ValidationIssue::item(index, path, rule));
                item_ok = false;
            };

            let previous_value = current
                .and_then(|fields| fields.get(path))
                .cloned()
                .unwrap_or(FieldValue::Null);
            let new_value = normalized(&proposed.new_value);

            if new_value.is_null() {
                if policy.required {
                    flag(ValidationRule::RequiredField);
                } else if current.is_some() && previous_value.is_null() {
                    flag(ValidationRule::NothingToDelete);
                }
            } else if !policy.field_type.accepts(&new_value) {
                flag(ValidationRule::TypeMismatch {
                    expected: policy.field_type.label(),
                    found: new_value.kind_label(),
                });
            } else if let Some(rule) = check_format(&policy.field_type, &new_value) {
                flag(rule);
            } else if current.is_some() && previous_value == new_value {
                flag(ValidationRule::NoChange);
            }

            if !item_ok {
                continue;
            }

            let change_kind = if new_value.is_null() {
                ChangeKind::Delete
            } else if previous_value.is_null() {
                ChangeKind::Create
            } else {
                ChangeKind::Update
            };

            validated.push(ValidatedChange {
                field_path: path.clone(),
                field_label: policy.label,
                previous_value,
                new_value,
                change_kind,
                is_sevis_related: policy.is_sevis_related,
                required_approval_level: policy.required_approval_level,
            });
        }

        if issues.is_empty() {
            Ok(validated)
        } else {
            issues.sort_by_key(|issue| issue.item_index);
            Err(ValidationError { issues })
        }
    }
}

/// Text is compared and stored without surrounding whitespace.
fn normalized(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Text(text) => FieldValue::Text(text.trim().to_string()),
        other => other.clone(),
    }
}

fn check_format(field_type: &FieldType, value: &FieldValue) -> Option<ValidationRule> {
    let FieldValue::Text(text) = value else {
        return None;
    };
    let trimmed = text.as_str();
    if trimmed.is_empty() {
        return Some(ValidationRule::BlankValue);
    }

    match field_type {
        FieldType::Email => {
            let valid = trimmed
                .split_once('@')
                .map(|(local, domain)| {
                    !local.is_empty() && domain.contains('.') && !domain.contains('@')
                })
                .unwrap_or(false);
            (!valid).then(|| ValidationRule::InvalidFormat {
                detail: format!("'{trimmed}' is not an email address"),
            })
        }
        FieldType::Choice(options) => {
            (!options.iter().any(|option| option == trimmed)).then(|| {
                ValidationRule::InvalidFormat {
                    detail: format!("'{trimmed}' is not one of {}", options.join(", ")),
                }
            })
        }
        _ => None,
    }
}

/// Rejections must say why; whitespace-only reasons are refused.
pub fn rejection_reason(reason: Option<&str>) -> Result<String, ValidationError> {
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason.to_string()),
        _ => Err(ValidationError::single(ValidationRule::EmptyRejectionReason)),
    }
}

pub fn comment_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(ValidationError::single(ValidationRule::BlankComment))
    } else {
        Ok(trimmed.to_string())
    }
}
