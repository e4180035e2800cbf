use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::placeholders;

/// One compiled field-mapping value. Decided once at configuration time so
/// the send path never re-parses the raw JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTemplate {
    Literal(String),
    /// The full catalog token, braces included, e.g. `{{client.name}}`.
    Placeholder(String),
}

/// A field mapping compiled to tagged variants, ready for single-pass
/// resolution against a [`SyncContext`].
#[derive(Debug, Clone, Default)]
pub struct CompiledMapping {
    fields: Vec<(String, FieldTemplate)>,
}

impl CompiledMapping {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldTemplate)> {
        self.fields.iter().map(|(name, tpl)| (name.as_str(), tpl))
    }
}

/// Compiles a stored mapping. A value is a Placeholder iff the whole string
/// is `{{<token>}}` and the token exists in the catalog; a full-string
/// `{{...}}` with an unknown token fails; anything else, including values
/// that merely contain `{{...}}`, stays a Literal verbatim. Partial
/// interpolation is deliberately unsupported.
pub fn compile(raw: &HashMap<String, String>) -> Result<CompiledMapping> {
    let mut fields = Vec::with_capacity(raw.len());
    // Sort for a deterministic field order independent of map iteration.
    let mut entries: Vec<_> = raw.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (name, value) in entries {
        let template = match placeholder_token(value) {
            Some(token) => {
                if placeholders::is_known(token) {
                    FieldTemplate::Placeholder(token.to_string())
                } else {
                    return Err(Error::Mapping(format!(
                        "field '{}' references unknown placeholder token '{}'",
                        name, token
                    )));
                }
            }
            None => FieldTemplate::Literal(value.clone()),
        };
        fields.push((name.clone(), template));
    }

    Ok(CompiledMapping { fields })
}

/// Compiles a mapping stored as raw JSON text (the settings UI persists the
/// operator's edit buffer as-is).
pub fn compile_json(raw: &str) -> Result<CompiledMapping> {
    let parsed: HashMap<String, String> = serde_json::from_str(raw)
        .map_err(|e| Error::Mapping(format!("field mapping is not a valid JSON object of strings: {}", e)))?;
    compile(&parsed)
}

/// Returns the full token (braces included) when the whole value is exactly
/// one `{{...}}` group with no nested braces.
fn placeholder_token(value: &str) -> Option<&str> {
    let inner = value.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.is_empty() || inner.contains('{') || inner.contains('}') {
        return None;
    }
    Some(value)
}

/// Builds the outbound body: `static_fields` first, then the compiled
/// mapping overlaid. A placeholder with no resolvable context value fails
/// the whole operation: the operator must learn the mapping references a
/// field not present for this invoice, not get a silently blanked value.
pub fn resolve(
    mapping: &CompiledMapping,
    static_fields: &HashMap<String, String>,
    context: &SyncContext,
) -> Result<BTreeMap<String, String>> {
    let mut body: BTreeMap<String, String> = static_fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (name, template) in mapping.fields() {
        let value = match template {
            FieldTemplate::Literal(text) => text.clone(),
            FieldTemplate::Placeholder(token) => context.value_of(token).ok_or_else(|| {
                Error::Mapping(format!(
                    "field '{}' maps to '{}' but the current invoice context has no value for it",
                    name, token
                ))
            })?,
        };
        body.insert(name.to_string(), value);
    }

    Ok(body)
}

/// The live data a placeholder resolves against, supplied by the caller at
/// send time. The engine never reads business records itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncContext {
    #[serde(default)]
    pub client: ClientContext,
    #[serde(default)]
    pub invoice: InvoiceContext,
    #[serde(default)]
    pub user: UserContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nip: Option<String>,
    #[serde(default)]
    pub bank_account: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceContext {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nip: Option<String>,
}

impl SyncContext {
    /// Resolves a catalog token. Empty strings count as missing; an empty
    /// client name in a remote CRM field helps nobody.
    pub fn value_of(&self, token: &str) -> Option<String> {
        let value = match token {
            "{{client.name}}" => &self.client.name,
            "{{client.email}}" => &self.client.email,
            "{{client.nip}}" => &self.client.nip,
            "{{client.bankAccount}}" => &self.client.bank_account,
            "{{client.address}}" => &self.client.address,
            "{{invoice.number}}" => &self.invoice.number,
            "{{invoice.amount}}" => &self.invoice.amount,
            "{{invoice.currency}}" => &self.invoice.currency,
            "{{invoice.date}}" => &self.invoice.date,
            "{{invoice.dueDate}}" => &self.invoice.due_date,
            "{{user.name}}" => &self.user.name,
            "{{user.nip}}" => &self.user.nip,
            _ => &None,
        };
        value.as_deref().filter(|v| !v.is_empty()).map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_string_token_compiles_to_placeholder() {
        let mut raw = HashMap::new();
        raw.insert("company".to_string(), "{{client.name}}".to_string());
        let compiled = compile(&raw).unwrap();
        let (_, tpl) = compiled.fields().next().unwrap();
        assert_eq!(tpl, &FieldTemplate::Placeholder("{{client.name}}".to_string()));
    }

    #[test]
    fn embedded_token_stays_literal() {
        let mut raw = HashMap::new();
        raw.insert(
            "note".to_string(),
            "invoice for {{client.name}}".to_string(),
        );
        let compiled = compile(&raw).unwrap();
        let (_, tpl) = compiled.fields().next().unwrap();
        assert_eq!(
            tpl,
            &FieldTemplate::Literal("invoice for {{client.name}}".to_string())
        );
    }

    #[test]
    fn adjacent_tokens_stay_literal() {
        // `{{a}}{{b}}` starts and ends with braces but is not one token.
        let mut raw = HashMap::new();
        raw.insert(
            "mixed".to_string(),
            "{{client.name}}{{client.nip}}".to_string(),
        );
        let compiled = compile(&raw).unwrap();
        let (_, tpl) = compiled.fields().next().unwrap();
        assert!(matches!(tpl, FieldTemplate::Literal(_)));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mut raw = HashMap::new();
        raw.insert("x".to_string(), "{{client.fax}}".to_string());
        assert!(matches!(compile(&raw), Err(Error::Mapping(_))));
    }
}
