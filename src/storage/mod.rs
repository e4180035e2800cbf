use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod encryption;
pub mod sqlite;
pub use sqlite::SqliteStorage;

/// One external CRM connection, as persisted. `password` holds the
/// AES-256-GCM blob produced by [`encryption::encrypt`]; decrypt only at
/// the moment of use and never hand the plaintext to a read API.
#[derive(Debug, Clone)]
pub struct Integration {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub login_url: String,
    pub login_method: String,
    pub email: String,
    pub password: String,
    pub csrf_selector: Option<String>,
    pub csrf_header: Option<String>,
    pub create_invoice_url: String,
    pub create_invoice_method: String,
    pub headers: HashMap<String, String>,
    pub field_mapping: HashMap<String, String>,
    pub static_fields: HashMap<String, String>,
    pub list_invoices_url: Option<String>,
    pub invoice_number_prefix: Option<String>,
    pub invoice_number_suffix: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Integration {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            is_active: true,
            login_url: String::new(),
            login_method: "POST".to_string(),
            email: String::new(),
            password: String::new(),
            csrf_selector: None,
            csrf_header: None,
            create_invoice_url: String::new(),
            create_invoice_method: "POST".to_string(),
            headers: HashMap::new(),
            field_mapping: HashMap::new(),
            static_fields: HashMap::new(),
            list_invoices_url: None,
            invoice_number_prefix: None,
            invoice_number_suffix: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Integration {
    pub fn view(&self) -> IntegrationView {
        IntegrationView {
            id: self.id,
            name: self.name.clone(),
            is_active: self.is_active,
            login_url: self.login_url.clone(),
            login_method: self.login_method.clone(),
            email: self.email.clone(),
            has_credential: !self.password.is_empty(),
            csrf_selector: self.csrf_selector.clone(),
            csrf_header: self.csrf_header.clone(),
            create_invoice_url: self.create_invoice_url.clone(),
            create_invoice_method: self.create_invoice_method.clone(),
            headers: self.headers.clone(),
            field_mapping: self.field_mapping.clone(),
            static_fields: self.static_fields.clone(),
            list_invoices_url: self.list_invoices_url.clone(),
            invoice_number_prefix: self.invoice_number_prefix.clone(),
            invoice_number_suffix: self.invoice_number_suffix.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read model: what every read API returns. The stored secret is reduced
/// to a `has_credential` flag, never echoed in any form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationView {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub login_url: String,
    pub login_method: String,
    pub email: String,
    pub has_credential: bool,
    pub csrf_selector: Option<String>,
    pub csrf_header: Option<String>,
    pub create_invoice_url: String,
    pub create_invoice_method: String,
    pub headers: HashMap<String, String>,
    pub field_mapping: HashMap<String, String>,
    pub static_fields: HashMap<String, String>,
    pub list_invoices_url: Option<String>,
    pub invoice_number_prefix: Option<String>,
    pub invoice_number_suffix: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Write model accepted from the settings UI / CLI. `password` arrives in
/// plaintext and is encrypted before it touches the database; `None` on an
/// update keeps the stored credential.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationInput {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub login_url: String,
    #[serde(default = "default_post")]
    pub login_method: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub csrf_selector: Option<String>,
    #[serde(default)]
    pub csrf_header: Option<String>,
    pub create_invoice_url: String,
    #[serde(default = "default_post")]
    pub create_invoice_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    #[serde(default)]
    pub static_fields: HashMap<String, String>,
    #[serde(default)]
    pub list_invoices_url: Option<String>,
    #[serde(default)]
    pub invoice_number_prefix: Option<String>,
    #[serde(default)]
    pub invoice_number_suffix: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_post() -> String {
    "POST".to_string()
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn init(&self) -> Result<()>;

    async fn create_integration(&self, input: &IntegrationInput) -> Result<Integration>;
    async fn update_integration(
        &self,
        id: Uuid,
        input: &IntegrationInput,
    ) -> Result<Option<Integration>>;
    async fn get_integration(&self, id: Uuid) -> Result<Option<Integration>>;
    async fn list_integrations(&self) -> Result<Vec<Integration>>;
    async fn delete_integration(&self, id: Uuid) -> Result<bool>;
}
