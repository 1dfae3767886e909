//! AED corpus maintenance.
//!
//! Cold starts (or long outages) rebuild the whole corpus from an
//! Overpass snapshot; otherwise minute-grain replication diffs are
//! applied incrementally. Diff batches are deduplicated so only the
//! highest version per node survives, and a node whose surviving action
//! is a delete, or a modify that dropped the defibrillator tag, is
//! removed.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::Point;
use openaedmap_aed_models::{Aed, is_defibrillator};
use openaedmap_config::{AED_STATE_VERSION, OVERPASS_TIMEOUT};
use openaedmap_database::counts::CountCache;
use openaedmap_database::state::{self, StateDoc};
use openaedmap_database::{aed as aed_db, db};
use openaedmap_source::overpass::query_overpass;
use openaedmap_source::replication::get_planet_diffs;
use openaedmap_source::SourceError;
use openaedmap_source_models::{NodeAction, OverpassElement};
use switchy_database::Database;
use tokio::sync::watch;

use crate::schedule::run_task_loop;
use crate::{IngestError, now_epoch};

/// Long-running AED update task; see
/// [`run_task_loop`](crate::schedule::run_task_loop) for the loop
/// contract.
pub async fn update_task(
    db: Arc<dyn Database>,
    client: reqwest::Client,
    counts: Arc<CountCache>,
    started: watch::Sender<bool>,
) {
    let already_started = last_update(db.as_ref()).await > 0.0;

    run_task_loop(
        "AED update",
        openaedmap_config::aed_update_delay(),
        started,
        already_started,
        || update_aed_db(db.as_ref(), &client, &counts),
    )
    .await;
}

/// Runs one AED update pass, selecting snapshot or diff mode by the age
/// of the last successful update.
///
/// # Errors
///
/// Returns [`IngestError`] if a fetch or database statement fails; the
/// scheduler retries with backoff. Either mode leaves the previous
/// committed state untouched on failure.
pub async fn update_aed_db(
    db: &dyn Database,
    client: &reqwest::Client,
    counts: &CountCache,
) -> Result<(), IngestError> {
    let (update_required, update_timestamp) = should_update(db).await?;
    if !update_required {
        return Ok(());
    }

    let update_age = now_epoch() - update_timestamp;
    if update_age > openaedmap_config::aed_rebuild_threshold().as_secs_f64() {
        update_db_snapshot(db, client, counts).await
    } else {
        update_db_diffs(db, client, counts, update_timestamp).await
    }
}

/// Rebuilds the corpus from an Overpass snapshot.
async fn update_db_snapshot(
    db: &dyn Database,
    client: &reqwest::Client,
    counts: &CountCache,
) -> Result<(), IngestError> {
    log::info!("Updating aed database (overpass)...");
    let (elements, data_timestamp) = query_overpass(client, OVERPASS_TIMEOUT.as_secs()).await?;

    let aeds = elements
        .into_iter()
        .map(process_overpass_node)
        .collect::<Result<Vec<_>, _>>()?;

    aed_db::replace_all(db, &aeds, StateDoc::new(data_timestamp, AED_STATE_VERSION)).await?;

    if !aeds.is_empty() {
        log::info!("Updating country codes");
        aed_db::assign_country_codes_all(db).await?;
        counts.invalidate_all();

        log::info!("Updating statistics");
        db::analyze(db, &["aed"]).await?;
    }

    log::info!("AED update finished (={})", aeds.len());
    Ok(())
}

/// Applies every replication diff newer than `last_update`.
async fn update_db_diffs(
    db: &dyn Database,
    client: &reqwest::Client,
    counts: &CountCache,
    last_update: f64,
) -> Result<(), IngestError> {
    log::info!("Updating aed database (diff)...");
    let (actions, data_timestamp) = get_planet_diffs(client, last_update).await?;

    if data_timestamp <= last_update {
        log::info!("Nothing to update");
        return Ok(());
    }

    let (upserts, remove_ids) = collect_batches(&actions);

    aed_db::apply_diff(
        db,
        &upserts,
        &remove_ids,
        StateDoc::new(data_timestamp, AED_STATE_VERSION),
    )
    .await?;

    if !upserts.is_empty() {
        log::info!("Updating country codes");
        let touched: Vec<i64> = upserts.iter().map(|aed| aed.id).collect();
        aed_db::assign_country_codes_for_ids(db, &touched).await?;
        counts.invalidate_all();
    }

    log::info!(
        "AED update finished (+{}, -{})",
        upserts.len(),
        remove_ids.len()
    );
    Ok(())
}

/// Reduces a sequence-ordered action list to one upsert batch and one
/// delete batch.
///
/// Per node id only the highest-version action counts; on a version tie
/// the later action in sequence order wins. The surviving action maps
/// to an upsert when it still carries the defibrillator tag and to a
/// delete otherwise, whether it was an explicit delete or a modify that
/// dropped the tag.
#[must_use]
pub fn collect_batches(actions: &[NodeAction]) -> (Vec<Aed>, Vec<i64>) {
    let mut latest: BTreeMap<i64, &NodeAction> = BTreeMap::new();
    for action in actions {
        latest
            .entry(action.id())
            .and_modify(|current| {
                if action.version() >= current.version() {
                    *current = action;
                }
            })
            .or_insert(action);
    }

    let mut upserts = Vec::new();
    let mut remove_ids = Vec::new();

    for (id, action) in latest {
        match action {
            NodeAction::Create(node) | NodeAction::Modify(node) => {
                if is_defibrillator(&node.tags) {
                    upserts.push(Aed {
                        id: node.id,
                        version: node.version,
                        tags: node.tags.clone(),
                        position: Point::new(node.lon, node.lat),
                        country_codes: None,
                    });
                } else {
                    remove_ids.push(id);
                }
            }
            NodeAction::Delete { .. } => remove_ids.push(id),
        }
    }

    (upserts, remove_ids)
}

/// Converts an Overpass element to an AED row; the query only matches
/// defibrillator nodes, so anything else means a corrupted snapshot.
fn process_overpass_node(element: OverpassElement) -> Result<Aed, IngestError> {
    if !is_defibrillator(&element.tags) {
        return Err(IngestError::Source(SourceError::MalformedSnapshot {
            message: format!("Unexpected non-defibrillator node {}", element.id),
        }));
    }

    Ok(Aed {
        id: element.id,
        version: element.version,
        tags: element.tags,
        position: Point::new(element.lon, element.lat),
        country_codes: None,
    })
}

/// Whether an update is due, and the stored data timestamp.
async fn should_update(db: &dyn Database) -> Result<(bool, f64), IngestError> {
    let Some(doc) = state::get(db, "aed").await? else {
        return Ok((true, 0.0));
    };
    if doc.version < AED_STATE_VERSION {
        return Ok((true, 0.0));
    }

    let update_age = now_epoch() - doc.update_timestamp;
    if update_age > openaedmap_config::aed_update_delay().as_secs_f64() {
        return Ok((true, doc.update_timestamp));
    }

    Ok((false, doc.update_timestamp))
}

/// The stored data timestamp, `0` when absent or from an older schema.
async fn last_update(db: &dyn Database) -> f64 {
    match should_update(db).await {
        Ok((_, timestamp)) => timestamp,
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openaedmap_source_models::DiffNode;

    fn marker_tags() -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("emergency".to_string(), "defibrillator".to_string());
        tags
    }

    fn node(id: i64, version: i64, lon: f64, lat: f64) -> DiffNode {
        DiffNode {
            id,
            version,
            lon,
            lat,
            tags: marker_tags(),
        }
    }

    #[test]
    fn modify_superseded_by_later_delete() {
        let actions = vec![
            NodeAction::Modify(node(1, 6, 1.0, 1.0)),
            NodeAction::Delete { id: 1, version: 7 },
        ];

        let (upserts, removes) = collect_batches(&actions);
        assert!(upserts.is_empty());
        assert_eq!(removes, vec![1]);
    }

    #[test]
    fn highest_version_wins_regardless_of_order() {
        let forward = vec![
            NodeAction::Create(node(1, 1, 0.0, 0.0)),
            NodeAction::Modify(node(1, 2, 5.0, 5.0)),
        ];
        let backward = vec![
            NodeAction::Modify(node(1, 2, 5.0, 5.0)),
            NodeAction::Create(node(1, 1, 0.0, 0.0)),
        ];

        let (forward_upserts, _) = collect_batches(&forward);
        let (backward_upserts, _) = collect_batches(&backward);
        assert_eq!(forward_upserts, backward_upserts);
        assert_eq!(forward_upserts.len(), 1);
        assert_eq!(forward_upserts[0].version, 2);
        assert!((forward_upserts[0].position.x() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn modify_that_drops_the_marker_deletes() {
        let mut fire_extinguisher = node(2, 8, 0.0, 0.0);
        fire_extinguisher
            .tags
            .insert("emergency".to_string(), "fire_extinguisher".to_string());

        let (upserts, removes) = collect_batches(&[NodeAction::Modify(fire_extinguisher)]);
        assert!(upserts.is_empty());
        assert_eq!(removes, vec![2]);
    }

    #[test]
    fn delete_superseded_by_later_recreate() {
        let actions = vec![
            NodeAction::Delete { id: 3, version: 4 },
            NodeAction::Create(node(3, 5, 2.0, 2.0)),
        ];

        let (upserts, removes) = collect_batches(&actions);
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].id, 3);
        assert!(removes.is_empty());
    }

    #[test]
    fn version_ties_prefer_the_later_action() {
        let actions = vec![
            NodeAction::Modify(node(4, 5, 0.0, 0.0)),
            NodeAction::Delete { id: 4, version: 5 },
        ];

        let (upserts, removes) = collect_batches(&actions);
        assert!(upserts.is_empty());
        assert_eq!(removes, vec![4]);
    }

    #[test]
    fn independent_ids_keep_their_own_actions() {
        let actions = vec![
            NodeAction::Create(node(1, 1, 0.0, 0.0)),
            NodeAction::Delete { id: 2, version: 3 },
            NodeAction::Modify(node(3, 2, 1.0, 1.0)),
        ];

        let (upserts, removes) = collect_batches(&actions);
        assert_eq!(upserts.len(), 2);
        assert_eq!(removes, vec![2]);
    }

    #[test]
    fn overpass_nodes_must_carry_the_marker() {
        let element = OverpassElement {
            id: 9,
            version: 1,
            lon: 0.0,
            lat: 0.0,
            tags: BTreeMap::new(),
        };
        assert!(process_overpass_node(element).is_err());
    }
}
