use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Human-readable metadata for one substitution token, as shown by the
/// settings UI next to the field-mapping editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceholderInfo {
    pub description: String,
    pub example: String,
}

struct CatalogEntry {
    token: &'static str,
    description: &'static str,
    example: &'static str,
}

// Declaration order is load-bearing: suggestion ties resolve to the first
// entry. Adding a token here is a catalog change, not a runtime concern.
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        token: "{{client.name}}",
        description: "Client company or person name",
        example: "Acme Sp. z o.o.",
    },
    CatalogEntry {
        token: "{{client.email}}",
        description: "Client billing e-mail address",
        example: "invoices@acme.example",
    },
    CatalogEntry {
        token: "{{client.nip}}",
        description: "Client tax identification number (NIP)",
        example: "5213017228",
    },
    CatalogEntry {
        token: "{{client.bankAccount}}",
        description: "Client bank account number",
        example: "PL61109010140000071219812874",
    },
    CatalogEntry {
        token: "{{client.address}}",
        description: "Client street address",
        example: "ul. Prosta 51, 00-838 Warszawa",
    },
    CatalogEntry {
        token: "{{invoice.number}}",
        description: "Local invoice number",
        example: "2024/07/015",
    },
    CatalogEntry {
        token: "{{invoice.amount}}",
        description: "Invoice gross total",
        example: "1230.00",
    },
    CatalogEntry {
        token: "{{invoice.currency}}",
        description: "Invoice currency code",
        example: "PLN",
    },
    CatalogEntry {
        token: "{{invoice.date}}",
        description: "Invoice issue date (YYYY-MM-DD)",
        example: "2024-07-15",
    },
    CatalogEntry {
        token: "{{invoice.dueDate}}",
        description: "Invoice payment due date (YYYY-MM-DD)",
        example: "2024-07-29",
    },
    CatalogEntry {
        token: "{{user.name}}",
        description: "Issuing user (seller) name",
        example: "Jan Kowalski",
    },
    CatalogEntry {
        token: "{{user.nip}}",
        description: "Issuing user (seller) tax identification number",
        example: "1132456775",
    },
];

/// All tokens in declaration order.
pub fn tokens() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|e| e.token)
}

pub fn is_known(token: &str) -> bool {
    CATALOG.iter().any(|e| e.token == token)
}

pub fn info(token: &str) -> Option<PlaceholderInfo> {
    CATALOG.iter().find(|e| e.token == token).map(|e| PlaceholderInfo {
        description: e.description.to_string(),
        example: e.example.to_string(),
    })
}

/// The full catalog as the wire map served by `GET /api/placeholders`.
pub fn list() -> BTreeMap<String, PlaceholderInfo> {
    CATALOG
        .iter()
        .map(|e| {
            (
                e.token.to_string(),
                PlaceholderInfo {
                    description: e.description.to_string(),
                    example: e.example.to_string(),
                },
            )
        })
        .collect()
}

/// Suggests a token for a captured field value: exact match against a
/// catalog example first, then case-insensitive substring match against
/// example and description. First catalog entry wins on ties.
pub fn suggest_for_value(value: &str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for entry in CATALOG {
        if entry.example == value {
            return Some(entry.token);
        }
    }

    // Very short values would substring-match half the catalog.
    if value.len() < 3 {
        return None;
    }

    let needle = value.to_lowercase();
    for entry in CATALOG {
        let example = entry.example.to_lowercase();
        let description = entry.description.to_lowercase();
        if example.contains(&needle) || needle.contains(&example) || description.contains(&needle) {
            return Some(entry.token);
        }
    }

    None
}
