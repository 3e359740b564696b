//! Structured payload extractor
//!
//! Walks the JSON document a listing API returned and picks values whose
//! key names a contact field. The JSON path becomes the candidate context.

use serde_json::{Map, Value};

use cdp_core::{CandidateContact, ContactType, ExtractionMethod, ListingPayload};

use crate::{ContactExtractor, Result};

const PHONE_KEYS: &[&str] = &[
    "phone",
    "phonenumber",
    "telephone",
    "telefon",
    "telefonnummer",
    "tel",
    "mobile",
    "mobilenumber",
    "mobil",
    "handy",
    "cellphone",
    "contactphone",
];

const EMAIL_KEYS: &[&str] = &[
    "email",
    "emailaddress",
    "emailadresse",
    "mail",
    "contactemail",
];

const WEBSITE_KEYS: &[&str] = &["website", "homepage", "webseite", "web", "companyurl"];

const NAME_KEYS: &[&str] = &[
    "contactname",
    "contactperson",
    "ansprechpartner",
    "agentname",
    "realtorname",
    "landlordname",
    "vermieter",
];

/// Parents under which a plain `name` key names a person
const CONTACT_PARENTS: &[&str] = &[
    "contact",
    "contacts",
    "kontakt",
    "agent",
    "realtor",
    "landlord",
    "owner",
    "vermieter",
    "makler",
    "anbieter",
    "provider",
];

const FIRST_NAME_KEYS: &[&str] = &["firstname", "vorname", "givenname"];
const LAST_NAME_KEYS: &[&str] = &["lastname", "nachname", "surname", "familyname"];

/// Confidence for a value that has the expected shape
const SHAPED_CONFIDENCE: f32 = 0.9;
/// Confidence for a value found under a contact key but looking off
const UNSHAPED_CONFIDENCE: f32 = 0.7;

/// Extractor over `ListingPayload::structured`
#[derive(Debug, Default, Clone)]
pub struct StructuredPayloadExtractor;

impl StructuredPayloadExtractor {
    pub fn new() -> Self {
        Self
    }

    fn walk(
        &self,
        value: &Value,
        path: &str,
        parent_key: Option<&str>,
        listing_id: &str,
        out: &mut Vec<CandidateContact>,
    ) {
        match value {
            Value::Object(map) => {
                self.collect_object(map, path, parent_key, listing_id, out);
                for (key, child) in map {
                    if child.is_object() || child.is_array() {
                        let child_path = join_path(path, key);
                        self.walk(child, &child_path, Some(key.as_str()), listing_id, out);
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if item.is_object() || item.is_array() {
                        let child_path = format!("{path}[{i}]");
                        self.walk(item, &child_path, parent_key, listing_id, out);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_object(
        &self,
        map: &Map<String, Value>,
        path: &str,
        parent_key: Option<&str>,
        listing_id: &str,
        out: &mut Vec<CandidateContact>,
    ) {
        let under_contact = parent_key
            .map(|p| CONTACT_PARENTS.contains(&canonical_key(p).as_str()))
            .unwrap_or(false);

        let mut first_name = None;
        let mut last_name = None;

        for (key, child) in map {
            let canonical = canonical_key(key);
            let contact_type = classify_key(&canonical, under_contact);

            if FIRST_NAME_KEYS.contains(&canonical.as_str()) {
                first_name = scalar_text(child);
            } else if LAST_NAME_KEYS.contains(&canonical.as_str()) {
                last_name = scalar_text(child);
            }

            let Some(contact_type) = contact_type else {
                continue;
            };

            let field_path = join_path(path, key);
            for raw in scalar_values(child) {
                out.push(candidate(contact_type, raw, &field_path, listing_id));
            }
        }

        let full_name = match (first_name, last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (None, Some(last)) => Some(last),
            _ => None,
        };
        if let Some(name) = full_name {
            let field_path = join_path(path, "name");
            out.push(candidate(ContactType::Name, name, &field_path, listing_id));
        }
    }
}

impl ContactExtractor for StructuredPayloadExtractor {
    fn name(&self) -> &str {
        "structured_payload"
    }

    fn methods(&self) -> &[ExtractionMethod] {
        &[ExtractionMethod::StructuredApi]
    }

    fn extract(&self, listing: &ListingPayload) -> Result<Vec<CandidateContact>> {
        let Some(structured) = &listing.structured else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        self.walk(structured, "", None, &listing.listing_id, &mut candidates);
        Ok(candidates)
    }
}

fn candidate(
    contact_type: ContactType,
    raw: String,
    path: &str,
    listing_id: &str,
) -> CandidateContact {
    let confidence = if has_expected_shape(contact_type, &raw) {
        SHAPED_CONFIDENCE
    } else {
        UNSHAPED_CONFIDENCE
    };

    CandidateContact::new(
        contact_type,
        raw,
        ExtractionMethod::StructuredApi,
        confidence,
        listing_id,
    )
    .with_context(path)
}

/// Lower-case key without separators: "E-Mail_Address" -> "emailaddress"
fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn classify_key(canonical: &str, under_contact: bool) -> Option<ContactType> {
    if PHONE_KEYS.contains(&canonical) {
        Some(ContactType::Phone)
    } else if EMAIL_KEYS.contains(&canonical) {
        Some(ContactType::Email)
    } else if WEBSITE_KEYS.contains(&canonical) {
        Some(ContactType::Website)
    } else if NAME_KEYS.contains(&canonical) || (under_contact && canonical == "name") {
        Some(ContactType::Name)
    } else {
        None
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scalars directly under a key, including arrays of scalars
fn scalar_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn has_expected_shape(contact_type: ContactType, raw: &str) -> bool {
    match contact_type {
        ContactType::Phone => {
            let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
            digits >= 6
                && raw
                    .chars()
                    .all(|c| c.is_ascii_digit() || " +()/-.".contains(c))
        }
        ContactType::Email => raw
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false),
        ContactType::Website => raw.contains('.') && !raw.contains(char::is_whitespace),
        ContactType::Name => {
            raw.chars().any(char::is_alphabetic) && !raw.chars().any(|c| c.is_ascii_digit())
        }
    }
}
