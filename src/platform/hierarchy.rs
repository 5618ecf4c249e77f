//! Hierarchy resolution over "Contains" relations.
//!
//! Starting from a customer or an estate/region/site asset, produce the flat
//! list of sites (each with its devices) below it. The tree is rebuilt from
//! the platform on every call; nothing is cached between runs.

use std::collections::HashSet;

use tracing::debug;

use super::{EntityInfo, Platform};
use crate::error::{ReportError, Result};
use crate::models::{AssetLevel, DeviceNode, HierarchyResult, PlatformEntityType, SiteNode};

// ---

/// Resolve the site/device hierarchy below `entity_id`.
///
/// `entity_type` must be `Customer` or `Asset`; an asset whose `type` is not
/// estate, region or site fails with [`ReportError::UnsupportedEntityType`].
pub async fn resolve(
    platform: &dyn Platform,
    entity_id: &str,
    entity_type: PlatformEntityType,
) -> Result<HierarchyResult> {
    // ---
    let mut walker = Walker::new(platform);

    let result = match entity_type {
        PlatformEntityType::Customer => {
            let customer = platform.get_entity(entity_id, entity_type).await?;
            let assets = platform.get_customer_assets(entity_id).await?;
            walker.visit_customer_assets(&assets).await?;

            HierarchyResult {
                id: entity_id.to_string(),
                name: customer.name,
                entity_type,
                asset_level: None,
                sites: walker.sites,
            }
        }
        PlatformEntityType::Asset => {
            let asset = platform.get_entity(entity_id, entity_type).await?;
            let level = AssetLevel::from_asset_type(&asset.kind).ok_or_else(|| {
                ReportError::UnsupportedEntityType(format!(
                    "asset type '{}' for asset {}",
                    asset.kind, entity_id
                ))
            })?;
            walker.visit(level, entity_id, &asset.name).await?;

            HierarchyResult {
                id: entity_id.to_string(),
                name: asset.name,
                entity_type,
                asset_level: Some(level),
                sites: walker.sites,
            }
        }
        PlatformEntityType::Device => {
            return Err(ReportError::UnsupportedEntityType(
                "reports cannot be rooted at a device".into(),
            ))
        }
    };

    debug!(
        entity_id,
        sites = result.sites.len(),
        devices = result.device_count(),
        "Hierarchy resolved"
    );
    Ok(result)
}

/// Accumulates sites while walking, dropping anything already reached by
/// another relation path.
struct Walker<'a> {
    platform: &'a dyn Platform,
    sites: Vec<SiteNode>,
    seen_sites: HashSet<String>,
    seen_devices: HashSet<String>,
}

impl<'a> Walker<'a> {
    // ---
    fn new(platform: &'a dyn Platform) -> Self {
        Walker {
            platform,
            sites: Vec::new(),
            seen_sites: HashSet::new(),
            seen_devices: HashSet::new(),
        }
    }

    async fn visit(&mut self, level: AssetLevel, id: &str, name: &str) -> Result<()> {
        match level {
            AssetLevel::Estate => self.visit_estate(id).await,
            AssetLevel::Region => self.visit_region(id).await,
            AssetLevel::Site => self.visit_site(id, name).await,
        }
    }

    /// Only the highest populated level among a customer's assets is walked.
    async fn visit_customer_assets(&mut self, assets: &[EntityInfo]) -> Result<()> {
        // ---
        for level in [AssetLevel::Estate, AssetLevel::Region, AssetLevel::Site] {
            let roots: Vec<&EntityInfo> = assets
                .iter()
                .filter(|a| AssetLevel::from_asset_type(&a.kind) == Some(level))
                .collect();
            if roots.is_empty() {
                continue;
            }
            for root in roots {
                self.visit(level, &root.id, &root.name).await?;
            }
            break;
        }
        Ok(())
    }

    /// Estates hold regions, or sites directly when there is no region level.
    async fn visit_estate(&mut self, estate_id: &str) -> Result<()> {
        // ---
        for child in self.child_assets(estate_id).await? {
            match AssetLevel::from_asset_type(&child.kind) {
                Some(AssetLevel::Region) => self.visit_region(&child.id).await?,
                Some(AssetLevel::Site) => self.visit_site(&child.id, &child.name).await?,
                _ => debug!(estate_id, child = %child.id, "Ignoring estate child of type '{}'", child.kind),
            }
        }
        Ok(())
    }

    async fn visit_region(&mut self, region_id: &str) -> Result<()> {
        // ---
        for child in self.child_assets(region_id).await? {
            if AssetLevel::from_asset_type(&child.kind) == Some(AssetLevel::Site) {
                self.visit_site(&child.id, &child.name).await?;
            }
        }
        Ok(())
    }

    async fn visit_site(&mut self, site_id: &str, site_name: &str) -> Result<()> {
        // ---
        if !self.seen_sites.insert(site_id.to_string()) {
            return Ok(());
        }

        let relations = self
            .platform
            .get_relations(site_id, PlatformEntityType::Asset)
            .await?;

        let mut devices = Vec::new();
        for rel in relations.iter().filter(|r| r.is(PlatformEntityType::Device)) {
            if !self.seen_devices.insert(rel.id.clone()) {
                continue;
            }
            let device = self
                .platform
                .get_entity(&rel.id, PlatformEntityType::Device)
                .await?;
            devices.push(DeviceNode {
                id: rel.id.clone(),
                name: device.name,
            });
        }

        self.sites.push(SiteNode {
            id: site_id.to_string(),
            name: site_name.to_string(),
            devices,
        });
        Ok(())
    }

    async fn child_assets(&self, parent_id: &str) -> Result<Vec<EntityInfo>> {
        // ---
        let relations = self
            .platform
            .get_relations(parent_id, PlatformEntityType::Asset)
            .await?;

        let mut children = Vec::new();
        for rel in relations.iter().filter(|r| r.is(PlatformEntityType::Asset)) {
            children.push(
                self.platform
                    .get_entity(&rel.id, PlatformEntityType::Asset)
                    .await?,
            );
        }
        Ok(children)
    }
}
