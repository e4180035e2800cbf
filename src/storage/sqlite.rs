use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use super::{encryption, Integration, IntegrationInput, Storage};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS integrations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                login_url TEXT NOT NULL,
                login_method TEXT NOT NULL,
                email TEXT NOT NULL,
                password TEXT NOT NULL,
                csrf_selector TEXT,
                csrf_header TEXT,
                create_invoice_url TEXT NOT NULL,
                create_invoice_method TEXT NOT NULL,
                headers TEXT NOT NULL,
                field_mapping TEXT NOT NULL,
                static_fields TEXT NOT NULL,
                list_invoices_url TEXT,
                invoice_number_prefix TEXT,
                invoice_number_suffix TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_integration(&self, input: &IntegrationInput) -> Result<Integration> {
        let Some(password) = &input.password else {
            bail!("a password is required to create an integration");
        };
        let encrypted = encryption::encrypt(password)?;

        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            is_active: input.is_active,
            login_url: input.login_url.clone(),
            login_method: input.login_method.clone(),
            email: input.email.clone(),
            password: encrypted,
            csrf_selector: input.csrf_selector.clone(),
            csrf_header: input.csrf_header.clone(),
            create_invoice_url: input.create_invoice_url.clone(),
            create_invoice_method: input.create_invoice_method.clone(),
            headers: input.headers.clone(),
            field_mapping: input.field_mapping.clone(),
            static_fields: input.static_fields.clone(),
            list_invoices_url: input.list_invoices_url.clone(),
            invoice_number_prefix: input.invoice_number_prefix.clone(),
            invoice_number_suffix: input.invoice_number_suffix.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO integrations (id, name, is_active, login_url, login_method, email, password,
                 csrf_selector, csrf_header, create_invoice_url, create_invoice_method,
                 headers, field_mapping, static_fields, list_invoices_url,
                 invoice_number_prefix, invoice_number_suffix, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(integration.id.to_string())
        .bind(&integration.name)
        .bind(integration.is_active)
        .bind(&integration.login_url)
        .bind(&integration.login_method)
        .bind(&integration.email)
        .bind(&integration.password)
        .bind(&integration.csrf_selector)
        .bind(&integration.csrf_header)
        .bind(&integration.create_invoice_url)
        .bind(&integration.create_invoice_method)
        .bind(serde_json::to_string(&integration.headers)?)
        .bind(serde_json::to_string(&integration.field_mapping)?)
        .bind(serde_json::to_string(&integration.static_fields)?)
        .bind(&integration.list_invoices_url)
        .bind(&integration.invoice_number_prefix)
        .bind(&integration.invoice_number_suffix)
        .bind(integration.created_at.to_rfc3339())
        .bind(integration.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(integration)
    }

    async fn update_integration(
        &self,
        id: Uuid,
        input: &IntegrationInput,
    ) -> Result<Option<Integration>> {
        let Some(existing) = self.get_integration(id).await? else {
            return Ok(None);
        };

        // No password in the input keeps the stored credential.
        let password = match &input.password {
            Some(plaintext) => encryption::encrypt(plaintext)?,
            None => existing.password.clone(),
        };

        let updated = Integration {
            id,
            name: input.name.clone(),
            is_active: input.is_active,
            login_url: input.login_url.clone(),
            login_method: input.login_method.clone(),
            email: input.email.clone(),
            password,
            csrf_selector: input.csrf_selector.clone(),
            csrf_header: input.csrf_header.clone(),
            create_invoice_url: input.create_invoice_url.clone(),
            create_invoice_method: input.create_invoice_method.clone(),
            headers: input.headers.clone(),
            field_mapping: input.field_mapping.clone(),
            static_fields: input.static_fields.clone(),
            list_invoices_url: input.list_invoices_url.clone(),
            invoice_number_prefix: input.invoice_number_prefix.clone(),
            invoice_number_suffix: input.invoice_number_suffix.clone(),
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        sqlx::query(
            "UPDATE integrations SET name=?, is_active=?, login_url=?, login_method=?, email=?,
                 password=?, csrf_selector=?, csrf_header=?, create_invoice_url=?,
                 create_invoice_method=?, headers=?, field_mapping=?, static_fields=?,
                 list_invoices_url=?, invoice_number_prefix=?, invoice_number_suffix=?, updated_at=?
             WHERE id=?",
        )
        .bind(&updated.name)
        .bind(updated.is_active)
        .bind(&updated.login_url)
        .bind(&updated.login_method)
        .bind(&updated.email)
        .bind(&updated.password)
        .bind(&updated.csrf_selector)
        .bind(&updated.csrf_header)
        .bind(&updated.create_invoice_url)
        .bind(&updated.create_invoice_method)
        .bind(serde_json::to_string(&updated.headers)?)
        .bind(serde_json::to_string(&updated.field_mapping)?)
        .bind(serde_json::to_string(&updated.static_fields)?)
        .bind(&updated.list_invoices_url)
        .bind(&updated.invoice_number_prefix)
        .bind(&updated.invoice_number_suffix)
        .bind(updated.updated_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Some(updated))
    }

    async fn get_integration(&self, id: Uuid) -> Result<Option<Integration>> {
        let row = sqlx::query("SELECT * FROM integrations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_integration(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        let rows = sqlx::query("SELECT * FROM integrations ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut integrations = Vec::with_capacity(rows.len());
        for row in rows {
            integrations.push(row_to_integration(&row)?);
        }
        Ok(integrations)
    }

    async fn delete_integration(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM integrations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_integration(row: &sqlx::sqlite::SqliteRow) -> Result<Integration> {
    let headers: String = row.get("headers");
    let field_mapping: String = row.get("field_mapping");
    let static_fields: String = row.get("static_fields");

    Ok(Integration {
        id: Uuid::parse_str(row.get("id"))?,
        name: row.get("name"),
        is_active: row.get("is_active"),
        login_url: row.get("login_url"),
        login_method: row.get("login_method"),
        email: row.get("email"),
        password: row.get("password"),
        csrf_selector: row.get("csrf_selector"),
        csrf_header: row.get("csrf_header"),
        create_invoice_url: row.get("create_invoice_url"),
        create_invoice_method: row.get("create_invoice_method"),
        headers: parse_map(&headers).context("headers column")?,
        field_mapping: parse_map(&field_mapping).context("field_mapping column")?,
        static_fields: parse_map(&static_fields).context("static_fields column")?,
        list_invoices_url: row.get("list_invoices_url"),
        invoice_number_prefix: row.get("invoice_number_prefix"),
        invoice_number_suffix: row.get("invoice_number_suffix"),
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn parse_map(raw: &str) -> Result<HashMap<String, String>> {
    Ok(serde_json::from_str(raw)?)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
