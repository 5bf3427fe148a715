// Declarative validation tables.
//
// Each kind lists its mandatory root attributes and the extra rules that
// apply once a document leaves draft (or reaches a specific status). One
// generic pass evaluates them; auto-save and manual save share it.

use docket_common::types::{DocumentKind, DocumentStatus};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusScope {
    /// Any status other than draft.
    NonDraft,
    Exactly(DocumentStatus),
}

impl StatusScope {
    fn applies_to(self, status: DocumentStatus) -> bool {
        match self {
            Self::NonDraft => !status.is_draft(),
            Self::Exactly(expected) => expected == status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRule {
    AtLeastOneItem,
    RequiresField(&'static str),
    AllRemarksCompleted,
}

pub struct KindRules {
    pub mandatory: &'static [&'static str],
    pub status_rules: &'static [(StatusScope, StatusRule)],
}

const QUOTATION_RULES: KindRules = KindRules {
    mandatory: &["billTo"],
    status_rules: &[(StatusScope::NonDraft, StatusRule::AtLeastOneItem)],
};

const INVOICE_RULES: KindRules = KindRules {
    mandatory: &["billTo", "invoiceDate"],
    status_rules: &[
        (StatusScope::NonDraft, StatusRule::AtLeastOneItem),
        (StatusScope::Exactly(DocumentStatus::Paid), StatusRule::RequiresField("paidDate")),
    ],
};

const PRODUCTION_TICKET_RULES: KindRules = KindRules {
    mandatory: &["projectName"],
    status_rules: &[
        (StatusScope::NonDraft, StatusRule::AtLeastOneItem),
        (StatusScope::Exactly(DocumentStatus::Final), StatusRule::AllRemarksCompleted),
    ],
};

pub fn rules_for(kind: DocumentKind) -> &'static KindRules {
    match kind {
        DocumentKind::Quotation => &QUOTATION_RULES,
        DocumentKind::Invoice => &INVOICE_RULES,
        DocumentKind::ProductionTicket => &PRODUCTION_TICKET_RULES,
    }
}

/// The effective document state a save would produce.
#[derive(Debug, Clone, Copy)]
pub struct ValidationSubject<'a> {
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub attributes: &'a Map<String, Value>,
    pub item_count: usize,
    pub open_remarks: usize,
    pub signature_count: usize,
}

/// Every field and rule a save failed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub fields: Vec<String>,
    pub rules: Vec<String>,
}

impl ValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.rules.is_empty()
    }

    fn missing_field(&mut self, field: &str) {
        if !self.fields.iter().any(|existing| existing == field) {
            self.fields.push(field.to_owned());
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.fields.is_empty() {
            parts.push(format!("missing required fields: {}", self.fields.join(", ")));
        }
        if !self.rules.is_empty() {
            parts.push(self.rules.join("; "));
        }
        f.write_str(&parts.join("; "))
    }
}

/// Null, absent, blank strings and empty arrays/objects count as missing.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Array(values)) => !values.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

pub fn validate(subject: &ValidationSubject<'_>) -> Result<(), ValidationFailure> {
    let rules = rules_for(subject.kind);
    let mut failure = ValidationFailure::default();

    for field in rules.mandatory {
        if !is_present(subject.attributes.get(*field)) {
            failure.missing_field(field);
        }
    }

    let name_field = subject.kind.name_field();
    if let Some(value) = subject.attributes.get(name_field) {
        if is_present(Some(value)) && !value.is_string() {
            failure.missing_field(name_field);
            failure.rules.push(format!("`{name_field}` must be text"));
        }
    }

    if !subject.kind.allowed_statuses().contains(&subject.status) {
        failure.missing_field("status");
        failure
            .rules
            .push(format!("status `{}` is not valid for a {}", subject.status, subject.kind));
    }

    if subject.signature_count > 0 && !subject.kind.supports_signatures() {
        failure.missing_field("signatures");
        failure.rules.push(format!("a {} does not carry signatures", subject.kind));
    }

    for (scope, rule) in rules.status_rules {
        if !scope.applies_to(subject.status) {
            continue;
        }
        match rule {
            StatusRule::AtLeastOneItem if subject.item_count == 0 => {
                failure.missing_field("items");
                failure.rules.push(format!("status `{}` requires at least one item", subject.status));
            }
            StatusRule::RequiresField(field) if !is_present(subject.attributes.get(*field)) => {
                failure.missing_field(field);
                failure.rules.push(format!("status `{}` requires `{field}`", subject.status));
            }
            StatusRule::AllRemarksCompleted if subject.open_remarks > 0 => {
                failure.missing_field("remarks");
                failure
                    .rules
                    .push(format!("status `{}` requires every remark completed", subject.status));
            }
            _ => {}
        }
    }

    if failure.is_empty() {
        Ok(())
    } else {
        Err(failure)
    }
}
