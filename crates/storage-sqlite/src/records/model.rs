//! Database rows for the replica collections.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crm_replica_core::entities::{
    CompanyFields, ContactFields, DealFields, EntityType, LocalRecord, RecordFields,
};
use crm_replica_core::{Error, Result};

use crate::utils::{
    json_from_db, json_to_db, timestamp_from_db, timestamp_opt_from_db, timestamp_opt_to_db,
    timestamp_to_db,
};

fn mismatched(expected: EntityType, record: &LocalRecord) -> Error {
    Error::Internal(format!(
        "Record {} carries {} fields, expected {}",
        record.remote_id,
        record.entity_type(),
        expected
    ))
}

/// Columns every replica table shares, encoded for storage.
struct CommonColumns {
    properties: String,
    remote_created_at: Option<String>,
    remote_updated_at: Option<String>,
    last_synced_at: String,
    sync_status: String,
}

impl CommonColumns {
    fn encode(record: &LocalRecord) -> Result<Self> {
        Ok(Self {
            properties: json_to_db(&record.properties)?,
            remote_created_at: timestamp_opt_to_db(record.remote_created_at),
            remote_updated_at: timestamp_opt_to_db(record.remote_updated_at),
            last_synced_at: timestamp_to_db(record.last_synced_at),
            sync_status: record.sync_status.as_str().to_string(),
        })
    }
}

fn decode(
    remote_id: String,
    fields: RecordFields,
    properties: &str,
    remote_created_at: Option<&str>,
    remote_updated_at: Option<&str>,
    last_synced_at: &str,
    sync_status: &str,
) -> Result<LocalRecord> {
    Ok(LocalRecord {
        remote_id,
        fields,
        properties: json_from_db(properties)?,
        remote_created_at: timestamp_opt_from_db(remote_created_at)?,
        remote_updated_at: timestamp_opt_from_db(remote_updated_at)?,
        last_synced_at: timestamp_from_db(last_synced_at)?,
        sync_status: sync_status.parse()?,
    })
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(remote_id))]
#[diesel(table_name = crate::schema::contacts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct ContactDB {
    pub remote_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub lifecycle_stage: Option<String>,
    pub properties: String,
    pub remote_created_at: Option<String>,
    pub remote_updated_at: Option<String>,
    pub last_synced_at: String,
    pub sync_status: String,
}

impl TryFrom<LocalRecord> for ContactDB {
    type Error = Error;

    fn try_from(record: LocalRecord) -> Result<Self> {
        let common = CommonColumns::encode(&record)?;
        let RecordFields::Contact(fields) = record.fields else {
            return Err(mismatched(EntityType::Contacts, &record));
        };
        Ok(Self {
            remote_id: record.remote_id,
            email: fields.email,
            first_name: fields.first_name,
            last_name: fields.last_name,
            phone: fields.phone,
            company_name: fields.company_name,
            job_title: fields.job_title,
            lifecycle_stage: fields.lifecycle_stage,
            properties: common.properties,
            remote_created_at: common.remote_created_at,
            remote_updated_at: common.remote_updated_at,
            last_synced_at: common.last_synced_at,
            sync_status: common.sync_status,
        })
    }
}

impl TryFrom<ContactDB> for LocalRecord {
    type Error = Error;

    fn try_from(row: ContactDB) -> Result<Self> {
        let fields = RecordFields::Contact(ContactFields {
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            company_name: row.company_name,
            job_title: row.job_title,
            lifecycle_stage: row.lifecycle_stage,
        });
        decode(
            row.remote_id,
            fields,
            &row.properties,
            row.remote_created_at.as_deref(),
            row.remote_updated_at.as_deref(),
            &row.last_synced_at,
            &row.sync_status,
        )
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(remote_id))]
#[diesel(table_name = crate::schema::companies)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CompanyDB {
    pub remote_id: String,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub employee_count: Option<i64>,
    pub annual_revenue: Option<f64>,
    pub properties: String,
    pub remote_created_at: Option<String>,
    pub remote_updated_at: Option<String>,
    pub last_synced_at: String,
    pub sync_status: String,
}

impl TryFrom<LocalRecord> for CompanyDB {
    type Error = Error;

    fn try_from(record: LocalRecord) -> Result<Self> {
        let common = CommonColumns::encode(&record)?;
        let RecordFields::Company(fields) = record.fields else {
            return Err(mismatched(EntityType::Companies, &record));
        };
        Ok(Self {
            remote_id: record.remote_id,
            name: fields.name,
            domain: fields.domain,
            industry: fields.industry,
            city: fields.city,
            country: fields.country,
            phone: fields.phone,
            employee_count: fields.employee_count,
            annual_revenue: fields.annual_revenue,
            properties: common.properties,
            remote_created_at: common.remote_created_at,
            remote_updated_at: common.remote_updated_at,
            last_synced_at: common.last_synced_at,
            sync_status: common.sync_status,
        })
    }
}

impl TryFrom<CompanyDB> for LocalRecord {
    type Error = Error;

    fn try_from(row: CompanyDB) -> Result<Self> {
        let fields = RecordFields::Company(CompanyFields {
            name: row.name,
            domain: row.domain,
            industry: row.industry,
            city: row.city,
            country: row.country,
            phone: row.phone,
            employee_count: row.employee_count,
            annual_revenue: row.annual_revenue,
        });
        decode(
            row.remote_id,
            fields,
            &row.properties,
            row.remote_created_at.as_deref(),
            row.remote_updated_at.as_deref(),
            &row.last_synced_at,
            &row.sync_status,
        )
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(remote_id))]
#[diesel(table_name = crate::schema::deals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct DealDB {
    pub remote_id: String,
    pub deal_name: Option<String>,
    pub amount: Option<f64>,
    pub deal_stage: Option<String>,
    pub pipeline: Option<String>,
    pub close_date: Option<String>,
    pub owner_id: Option<String>,
    /// JSON array of company remote IDs.
    pub company_ids: String,
    /// JSON array of contact remote IDs.
    pub contact_ids: String,
    pub is_closed: bool,
    pub is_won: bool,
    pub is_lost: bool,
    pub properties: String,
    pub remote_created_at: Option<String>,
    pub remote_updated_at: Option<String>,
    pub last_synced_at: String,
    pub sync_status: String,
}

impl TryFrom<LocalRecord> for DealDB {
    type Error = Error;

    fn try_from(record: LocalRecord) -> Result<Self> {
        let common = CommonColumns::encode(&record)?;
        let RecordFields::Deal(fields) = record.fields else {
            return Err(mismatched(EntityType::Deals, &record));
        };
        Ok(Self {
            remote_id: record.remote_id,
            deal_name: fields.deal_name,
            amount: fields.amount,
            deal_stage: fields.deal_stage,
            pipeline: fields.pipeline,
            close_date: timestamp_opt_to_db(fields.close_date),
            owner_id: fields.owner_id,
            company_ids: json_to_db(&fields.company_ids)?,
            contact_ids: json_to_db(&fields.contact_ids)?,
            is_closed: fields.is_closed,
            is_won: fields.is_won,
            is_lost: fields.is_lost,
            properties: common.properties,
            remote_created_at: common.remote_created_at,
            remote_updated_at: common.remote_updated_at,
            last_synced_at: common.last_synced_at,
            sync_status: common.sync_status,
        })
    }
}

impl TryFrom<DealDB> for LocalRecord {
    type Error = Error;

    fn try_from(row: DealDB) -> Result<Self> {
        let fields = RecordFields::Deal(DealFields {
            deal_name: row.deal_name,
            amount: row.amount,
            deal_stage: row.deal_stage,
            pipeline: row.pipeline,
            close_date: timestamp_opt_from_db(row.close_date.as_deref())?,
            owner_id: row.owner_id,
            company_ids: json_from_db(&row.company_ids)?,
            contact_ids: json_from_db(&row.contact_ids)?,
            is_closed: row.is_closed,
            is_won: row.is_won,
            is_lost: row.is_lost,
        });
        decode(
            row.remote_id,
            fields,
            &row.properties,
            row.remote_created_at.as_deref(),
            row.remote_updated_at.as_deref(),
            &row.last_synced_at,
            &row.sync_status,
        )
    }
}
