use std::collections::BTreeMap;

use storage::types::{BucketId, TableId};
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, OutputResult};
use crate::mapping::configuration::{ConfigOrigin, ResolvedConfiguration};

const CSV_SUFFIX: &str = ".csv";

/// Resolves the table a source is loaded into.
///
/// A mapping destination must be a full table id. A manifest destination may also be a bare
/// table name placed into `default_bucket`. Without any destination the file name is used,
/// which is deprecated.
pub fn resolve_destination(
    source_name: &str,
    resolved: &ResolvedConfiguration,
    default_bucket: Option<&str>,
) -> OutputResult<TableId> {
    let default_bucket = default_bucket.filter(|bucket| !bucket.trim().is_empty());

    match resolved.config.destination.as_deref() {
        Some(destination) => {
            if let Ok(table_id) = destination.parse::<TableId>() {
                return Ok(table_id);
            }

            if resolved.origin == ConfigOrigin::Manifest
                && let Some(bucket) = default_bucket
                && !destination.is_empty()
                && !destination.contains('.')
            {
                return Ok(TableId::new(BucketId::new(bucket), destination));
            }
        }
        None => {
            let name = source_name.strip_suffix(CSV_SUFFIX).unwrap_or(source_name);
            let table_id = match name.parse::<TableId>() {
                Ok(table_id) => Some(table_id),
                Err(_) => default_bucket
                    .filter(|_| !name.is_empty())
                    .map(|bucket| TableId::new(BucketId::new(bucket), name)),
            };

            if let Some(table_id) = table_id {
                warn!(
                    %table_id,
                    "Source table \"{source_name}\" has neither manifest file nor mapping set, falling back to the source name as a destination. This behaviour was DEPRECATED and will be removed in the future."
                );
                return Ok(table_id);
            }
        }
    }

    bail!(
        ErrorKind::DestinationResolutionFailed,
        "Destination resolution failed",
        format!("Failed to resolve destination for output table \"{source_name}\".")
    );
}

/// Fails when two distinct sources resolve to the same table.
pub fn check_unique_destinations<'a, I>(resolved: I) -> OutputResult<()>
where
    I: IntoIterator<Item = (&'a str, &'a TableId)>,
{
    let mut claims: BTreeMap<&TableId, &str> = BTreeMap::new();
    for (source_name, table_id) in resolved {
        match claims.get(table_id) {
            Some(claimed_by) if *claimed_by != source_name => {
                bail!(
                    ErrorKind::DuplicateDestination,
                    "Destination claimed by multiple sources",
                    format!(
                        "Destination \"{table_id}\" is claimed by multiple sources: \"{claimed_by}\", \"{source_name}\""
                    )
                );
            }
            Some(_) => {}
            None => {
                claims.insert(table_id, source_name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use config::shared::TableOutputConfig;

    use super::*;

    fn resolved(destination: Option<&str>, origin: ConfigOrigin) -> ResolvedConfiguration {
        ResolvedConfiguration {
            config: TableOutputConfig {
                destination: destination.map(str::to_string),
                ..Default::default()
            },
            origin,
        }
    }

    #[test]
    fn full_table_id_is_used_as_is() {
        let table_id = resolve_destination(
            "a.csv",
            &resolved(Some("in.c-main.a"), ConfigOrigin::Mapping),
            Some("out.c-other"),
        )
        .unwrap();
        assert_eq!(table_id.to_string(), "in.c-main.a");
    }

    #[test]
    fn manifest_table_name_uses_default_bucket() {
        let table_id = resolve_destination(
            "a.csv",
            &resolved(Some("table"), ConfigOrigin::Manifest),
            Some("in.c-main"),
        )
        .unwrap();
        assert_eq!(table_id.to_string(), "in.c-main.table");
    }

    #[test]
    fn mapping_table_name_is_rejected() {
        let err = resolve_destination(
            "a.csv",
            &resolved(Some("table"), ConfigOrigin::Mapping),
            Some("in.c-main"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationResolutionFailed);
        assert_eq!(
            err.detail(),
            Some("Failed to resolve destination for output table \"a.csv\".")
        );
    }

    #[test]
    fn file_name_is_a_deprecated_fallback() {
        let table_id = resolve_destination(
            "in.c-main.users.csv",
            &resolved(None, ConfigOrigin::Default),
            None,
        )
        .unwrap();
        assert_eq!(table_id.to_string(), "in.c-main.users");

        let table_id = resolve_destination(
            "users.csv",
            &resolved(None, ConfigOrigin::Default),
            Some("in.c-main"),
        )
        .unwrap();
        assert_eq!(table_id.to_string(), "in.c-main.users");

        assert!(
            resolve_destination("users", &resolved(None, ConfigOrigin::Default), None).is_err()
        );
    }

    #[test]
    fn distinct_sources_cannot_share_a_destination() {
        let table_id: TableId = "in.c-main.t".parse().unwrap();
        assert!(check_unique_destinations([("a.csv", &table_id), ("a.csv", &table_id)]).is_ok());

        let err =
            check_unique_destinations([("a.csv", &table_id), ("b.csv", &table_id)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateDestination);
    }
}
