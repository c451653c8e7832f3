//! Entity model: company-like records discovered or imported into a project
//!
//! Entities are append-mostly and never hard-deleted; removal sets
//! `deleted_at`. The identity hash is unique among non-deleted entities of
//! the same kind, enforced at the persistence boundary via insert-or-skip.

use crate::dedup;
use crate::taxid::Cnpj;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

/// What kind of company-like record this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Competitor,
    Lead,
    Market,
    Product,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Competitor => "competitor",
            EntityKind::Lead => "lead",
            EntityKind::Market => "market",
            EntityKind::Product => "product",
        }
    }
}

/// How the record entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Manual,
    Import,
    Enrichment,
}

/// Brazilian company size brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanySize {
    #[serde(rename = "MEI")]
    Mei,
    #[serde(rename = "Pequena")]
    Small,
    #[serde(rename = "Média")]
    Medium,
    #[serde(rename = "Grande")]
    Large,
}

/// Business model segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segmentation {
    B2B,
    B2C,
    B2B2C,
}

/// Where a record came from and how much we trust it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: Origin,
    /// Job that discovered this record, when origin is Enrichment
    pub source_job: Option<Uuid>,
    /// 0-100 confidence reported by the discovering connector
    pub confidence: u8,
}

impl Provenance {
    pub fn manual() -> Self {
        Self {
            origin: Origin::Manual,
            source_job: None,
            confidence: 100,
        }
    }

    pub fn enrichment(job_id: Uuid, confidence: u8) -> Self {
        Self {
            origin: Origin::Enrichment,
            source_job: Some(job_id),
            confidence: confidence.min(100),
        }
    }
}

/// Data-quality classification derived from the filled-field score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=100 => QualityTier::High,
            60..=89 => QualityTier::Medium,
            _ => QualityTier::Low,
        }
    }
}

/// A company-like record under a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub project_id: Uuid,
    pub kind: EntityKind,
    /// Stable identity fingerprint; see the dedup module
    pub identity_hash: String,

    pub name: String,
    /// Registered razão social when known; `name` stays the display name
    pub legal_name: Option<String>,
    pub tax_id: Option<Cnpj>,

    // Contact
    pub email: Option<String>,
    pub phone: Option<String>,
    pub site: Option<String>,

    // Location
    pub city: Option<String>,
    pub state: Option<String>,

    // Organization
    pub size: Option<CompanySize>,
    pub sector: Option<String>,
    pub segmentation: Option<Segmentation>,

    pub provenance: Provenance,
    pub quality_score: u8,
    pub quality_tier: QualityTier,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// Build a new record, deriving the identity hash from the tax id when
    /// present, otherwise from the name plus a discovery nonce.
    pub fn new(
        project_id: Uuid,
        kind: EntityKind,
        name: impl Into<String>,
        tax_id: Option<Cnpj>,
        provenance: Provenance,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        let identity_hash = match (&tax_id, kind) {
            (Some(cnpj), _) => dedup::identity_hash(kind, cnpj),
            // Markets and products have no registration; name is identity
            (None, EntityKind::Market | EntityKind::Product) => dedup::named_hash(kind, &name),
            (None, _) => dedup::fallback_hash(kind, &name, now.timestamp_millis()),
        };

        let mut entity = Self {
            id: Uuid::new_v4(),
            project_id,
            kind,
            identity_hash,
            name,
            legal_name: None,
            tax_id,
            email: None,
            phone: None,
            site: None,
            city: None,
            state: None,
            size: None,
            sector: None,
            segmentation: None,
            provenance,
            quality_score: 0,
            quality_tier: QualityTier::Low,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        entity.rescore();
        entity
    }

    /// Attach a resolved tax id and recompute the identity hash so later
    /// runs deduplicate exactly instead of via the name+nonce fallback.
    pub fn backfill_tax_id(&mut self, cnpj: Cnpj) {
        self.identity_hash = dedup::identity_hash(self.kind, &cnpj);
        self.tax_id = Some(cnpj);
        self.touch();
    }

    /// Filled-field quality score in 20-point increments, then tier.
    /// Invalid contact fields are dropped rather than counted.
    pub fn rescore(&mut self) {
        if let Some(email) = &self.email {
            if !email.validate_email() {
                self.email = None;
            }
        }
        if let Some(phone) = &self.phone {
            if !plausible_phone(phone) {
                self.phone = None;
            }
        }

        let mut score = 0u8;
        if self.segmentation.is_some() {
            score += 20;
        }
        if self.email.is_some() {
            score += 20;
        }
        if self.phone.is_some() {
            score += 20;
        }
        if self.site.is_some() {
            score += 20;
        }
        if self.size.is_some() {
            score += 20;
        }

        self.quality_score = score;
        self.quality_tier = QualityTier::from_score(score);
        self.touch();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Soft delete; records are never removed from the store
    pub fn mark_deleted(&mut self) {
        self.deleted_at = Some(Utc::now());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Brazilian landline/mobile numbers: 10 or 11 digits including area code,
/// optionally with the +55 country prefix
pub fn plausible_phone(raw: &str) -> bool {
    let re = regex_lite::Regex::new(r"^\+?[\d\s().-]+$").expect("static pattern");
    if !re.is_match(raw) {
        return false;
    }
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    let digits = if raw.trim_start().starts_with("+55") {
        digits - 2
    } else {
        digits
    };
    (10..=11).contains(&digits)
}
