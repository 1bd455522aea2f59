use std::collections::{BTreeMap, BTreeSet};

use storage::ClientError;

use crate::error::{ErrorKind, OutputResult};
use crate::inventory::{ManifestFile, PhysicalItem};
use crate::mapping::source::{DeclaredMapping, ResolvedSource};
use crate::output_error;

/// Kind of sources being combined. Only affects error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Table,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineOptions {
    pub kind: SourceKind,
    /// Also emit physical items no mapping refers to.
    pub include_unmapped: bool,
}

/// Names of the inputs a combine run consumed and left over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionReport {
    pub used_items: BTreeSet<String>,
    pub unused_items: BTreeSet<String>,
    pub used_manifests: BTreeSet<String>,
    pub unused_manifests: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct Combined<M> {
    pub sources: Vec<ResolvedSource<M>>,
    pub report: ConsumptionReport,
}

/// Joins physical items, declared mappings and manifests into resolved sources.
///
/// Sources come out in declaration order, followed by unmapped items in name order when
/// `include_unmapped` is set. The same source may be declared several times with different
/// destinations.
///
/// Fails when two distinct sources declare the same destination, when a declared source has
/// no physical item or when a manifest has no physical item.
pub fn combine<M>(
    items: &[PhysicalItem],
    mappings: &[M],
    manifests: &[ManifestFile],
    options: CombineOptions,
) -> OutputResult<Combined<M>>
where
    M: DeclaredMapping,
{
    check_declared_destinations(mappings)?;

    let items_by_name = items
        .iter()
        .map(|item| (item.name.as_str(), item))
        .collect::<BTreeMap<_, _>>();
    let manifests_by_source = manifests
        .iter()
        .map(|manifest| (manifest.source_name.as_str(), manifest))
        .collect::<BTreeMap<_, _>>();

    check_missing_sources(mappings, &items_by_name, options.kind)?;
    check_orphaned_manifests(manifests, &items_by_name, options.kind)?;

    let mut used_items = BTreeSet::new();
    let mut used_manifests = BTreeSet::new();
    let mut sources = Vec::with_capacity(mappings.len());

    let mut bind = |item: &PhysicalItem, mapping: Option<M>| {
        let manifest = manifests_by_source.get(item.name.as_str()).copied().cloned();
        if let Some(manifest) = &manifest {
            used_manifests.insert(manifest.name.clone());
        }
        used_items.insert(item.name.clone());

        ResolvedSource {
            source_name: item.name.clone(),
            item: item.clone(),
            manifest,
            mapping,
        }
    };

    for mapping in mappings {
        if let Some(item) = items_by_name.get(mapping.source()) {
            sources.push(bind(item, Some(mapping.clone())));
        }
    }

    if options.include_unmapped {
        let mapped = mappings
            .iter()
            .map(|mapping| mapping.source())
            .collect::<BTreeSet<_>>();
        for item in items_by_name.values() {
            if !mapped.contains(item.name.as_str()) {
                sources.push(bind(item, None));
            }
        }
    }

    let report = ConsumptionReport {
        unused_items: items_by_name
            .keys()
            .filter(|name| !used_items.contains(**name))
            .map(|name| name.to_string())
            .collect(),
        unused_manifests: manifests
            .iter()
            .filter(|manifest| !used_manifests.contains(&manifest.name))
            .map(|manifest| manifest.name.clone())
            .collect(),
        used_items,
        used_manifests,
    };

    Ok(Combined { sources, report })
}

fn check_declared_destinations<M>(mappings: &[M]) -> OutputResult<()>
where
    M: DeclaredMapping,
{
    let mut claims: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut order = Vec::new();
    for mapping in mappings {
        let Some(destination) = mapping.destination() else {
            continue;
        };

        let sources = claims.entry(destination).or_insert_with(|| {
            order.push(destination);
            Vec::new()
        });
        if !sources.contains(&mapping.source()) {
            sources.push(mapping.source());
        }
    }

    for destination in order {
        let Some(sources) = claims.get(destination) else {
            continue;
        };
        if sources.len() > 1 {
            return Err(output_error!(
                ErrorKind::DuplicateDestination,
                "Destination claimed by multiple sources",
                format!(
                    "Destination \"{destination}\" is claimed by multiple sources: {}",
                    quote_all(sources)
                )
            ));
        }
    }

    Ok(())
}

fn check_missing_sources<M>(
    mappings: &[M],
    items_by_name: &BTreeMap<&str, &PhysicalItem>,
    kind: SourceKind,
) -> OutputResult<()>
where
    M: DeclaredMapping,
{
    let mut missing = Vec::new();
    for mapping in mappings {
        let source = mapping.source();
        if !items_by_name.contains_key(source) && !missing.contains(&source) {
            missing.push(source);
        }
    }

    let Some(first) = missing.first() else {
        return Ok(());
    };

    let detail = match kind {
        SourceKind::Table => format!("Table sources not found: {}", quote_all(&missing)),
        SourceKind::File => format!("File '{first}' not found."),
    };

    Err(output_error!(
        ErrorKind::SourceNotFound,
        "Output mapping sources not found",
        detail
    )
    .with_status_code(ClientError::NOT_FOUND))
}

fn check_orphaned_manifests(
    manifests: &[ManifestFile],
    items_by_name: &BTreeMap<&str, &PhysicalItem>,
    kind: SourceKind,
) -> OutputResult<()> {
    let Some(orphan) = manifests
        .iter()
        .find(|manifest| !items_by_name.contains_key(manifest.source_name.as_str()))
    else {
        return Ok(());
    };

    let detail = match kind {
        SourceKind::Table => format!("Found orphaned table manifest: \"{}\"", orphan.name),
        SourceKind::File => format!("Found orphaned file manifest: '{}'", orphan.name),
    };

    Err(output_error!(
        ErrorKind::OrphanedManifest,
        "Orphaned manifest found",
        detail
    )
    .with_status_code(ClientError::NOT_FOUND))
}

fn quote_all(values: &[&str]) -> String {
    values
        .iter()
        .map(|value| format!("\"{value}\""))
        .collect::<Vec<_>>()
        .join(", ")
}
