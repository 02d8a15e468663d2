//! Page-script output and its conversion into the portfolio model.
//!
//! The in-page scripts only collect visible text. All numeric parsing and
//! filtering happens here so both sources share one set of rules.

use folio_core::{parse_amount, parse_percent, parse_usd, Asset, Project, Section, SectionKind};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::ExtractionError;

/// Everything a page script returns.
#[derive(Debug, Default, Deserialize)]
pub struct RawPage {
    /// Project containers seen on the page, including skipped ones
    #[serde(default)]
    pub containers: usize,
    #[serde(default)]
    pub projects: Vec<RawProject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProject {
    pub name: String,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub total_value: Option<String>,
    #[serde(default)]
    pub sections: Vec<RawSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawSection {
    pub label: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub assets: Vec<RawAsset>,
    #[serde(default)]
    pub supplied: Vec<RawAsset>,
    #[serde(default)]
    pub borrowed: Vec<RawAsset>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawAsset {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub apy: Option<String>,
}

impl RawPage {
    pub fn decode(value: serde_json::Value) -> Result<Self, ExtractionError> {
        if value.is_null() {
            return Err(ExtractionError::ParseFailure("page script returned nothing".to_string()));
        }
        serde_json::from_value(value).map_err(|e| ExtractionError::ParseFailure(e.to_string()))
    }
}

/// Convert raw projects, dropping assets below `min_usd` and unknown sections.
pub fn into_projects(raw: Vec<RawProject>, default_chain: &str, min_usd: Decimal) -> Vec<Project> {
    raw.into_iter()
        .map(|project| convert_project(project, default_chain, min_usd))
        .collect()
}

fn convert_project(raw: RawProject, default_chain: &str, min_usd: Decimal) -> Project {
    let sections: Vec<Section> = raw
        .sections
        .into_iter()
        .filter_map(|section| convert_section(section, min_usd))
        .collect();

    let chain_tag = raw
        .chain
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| default_chain.to_string());

    let mut project = Project {
        name: raw.name.trim().to_string(),
        chain_tag,
        total_value: Decimal::ZERO,
        sections,
    };
    project.total_value = match raw.total_value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => parse_usd(text),
        _ => project.computed_value(),
    };
    project
}

fn convert_section(raw: RawSection, min_usd: Decimal) -> Option<Section> {
    let Some(kind) = SectionKind::from_label(&raw.label) else {
        tracing::debug!(label = %raw.label, "Skipping unknown section");
        return None;
    };

    if kind == SectionKind::Lending {
        return Some(Section::Lending {
            market_name: raw.market.filter(|m| !m.trim().is_empty()),
            supplied: convert_assets(raw.supplied, min_usd),
            borrowed: convert_assets(raw.borrowed, min_usd),
        });
    }
    Section::with_assets(kind, convert_assets(raw.assets, min_usd))
}

fn convert_assets(raw: Vec<RawAsset>, min_usd: Decimal) -> Vec<Asset> {
    raw.into_iter()
        .filter_map(|asset| {
            let token = asset.token.trim().to_string();
            let value = asset.value.as_deref().map(parse_usd).unwrap_or_default();
            if token.is_empty() || value < min_usd {
                return None;
            }
            Some(Asset {
                token,
                balance: asset.balance.as_deref().map(parse_amount).unwrap_or_default(),
                value,
                apy: asset
                    .apy
                    .as_deref()
                    .filter(|a| !a.trim().is_empty())
                    .map(parse_percent),
            })
        })
        .collect()
}
