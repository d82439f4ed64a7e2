use std::sync::Arc;
use std::time::Duration;

use housing_desk::cache::{CacheKey, MemoryStorage};
use housing_desk::clock::Clock;
use housing_desk::config::StoreConfig;
use housing_desk::error::{ApiError, StoreError};
use housing_desk::filters::{PersonFilterPatch, PropertyFilterPatch, SortBy};
use housing_desk::models::{Location, PersonRole, Property, FALLBACK_LOCATION};
use housing_desk::store::LoadStatus;
use housing_desk::testkit::fixtures::{connection, link, person, property, sample_data};
use housing_desk::testkit::{eventually, settle, Harness, MockBackend};

fn ids(properties: &[Property]) -> Vec<i64> {
    properties.iter().map(|p| p.id).collect()
}

// ---------------------------------------------------------------------------
// Loading and deduplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_collection_loads_share_one_request() {
    let h = Harness::sample();
    h.backend.set_latency(Duration::from_millis(20));

    let (a, b) = tokio::join!(h.store.load_properties(), h.store.load_properties());

    assert_eq!(a, LoadStatus::Loaded);
    assert_eq!(b, LoadStatus::Loaded);
    assert_eq!(h.backend.calls("properties.get_all"), 1);
    assert_eq!(h.store.properties().len(), 3);
}

#[tokio::test]
async fn loaded_collection_is_not_fetched_again() {
    let h = Harness::sample();

    assert_eq!(h.store.load_persons().await, LoadStatus::Loaded);
    assert_eq!(h.store.load_persons().await, LoadStatus::Skipped);

    assert_eq!(h.backend.calls("persons.get_all"), 1);
}

#[tokio::test]
async fn collection_loaders_are_independent() {
    let h = Harness::sample();

    let (p, c, l) = tokio::join!(
        h.store.load_properties(),
        h.store.load_connections(),
        h.store.load_links()
    );

    assert_eq!((p, c, l), (LoadStatus::Loaded, LoadStatus::Loaded, LoadStatus::Loaded));
    assert_eq!(h.backend.total_calls(), 3);
    assert_eq!(h.store.connections().len(), 3);
    assert_eq!(h.store.links().len(), 3);
    assert!(h.store.persons().is_empty());
}

#[tokio::test]
async fn load_all_data_overwrites_collections_and_records_sync() {
    let h = Harness::sample();
    h.store.set_properties(vec![property(99, "Stale")]);

    assert_eq!(h.store.load_all_data().await, LoadStatus::Loaded);

    assert_eq!(h.store.properties().len(), 3);
    assert!(h.store.property(99).is_none());
    assert_eq!(h.store.last_sync(), Some(h.clock.now()));
    assert_eq!(h.store.error(), None);
}

#[tokio::test]
async fn failed_load_keeps_state_and_sets_error() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.fail("extract_all");

    assert_eq!(h.store.refresh().await, LoadStatus::Failed);

    assert_eq!(h.store.properties().len(), 3);
    let error = h.store.error().unwrap();
    assert!(error.starts_with("Failed to load all data"), "{error}");
    assert!(!h.store.loading().properties);
}

#[tokio::test]
async fn successful_operation_clears_error() {
    let h = Harness::sample();
    h.backend.fail("persons.get_all");
    assert_eq!(h.store.load_persons().await, LoadStatus::Failed);
    assert!(h.store.error().is_some());

    h.store.load_properties().await;

    assert_eq!(h.store.error(), None);
}

#[tokio::test]
async fn stuck_request_times_out_and_frees_the_key() {
    let config = StoreConfig {
        refresh_delay_ms: 10,
        request_timeout_secs: 1,
    };
    let h = Harness::with_config(
        MockBackend::with_data(sample_data()),
        Arc::new(MemoryStorage::new()),
        config,
    );
    h.backend.hang("extract_all");

    assert_eq!(h.store.load_all_data().await, LoadStatus::Failed);
    assert!(h.store.error().unwrap().contains("timed out"));
    assert!(!h.store.loading().properties);

    h.backend.recover("extract_all");
    assert_eq!(h.store.load_all_data().await, LoadStatus::Loaded);
    assert_eq!(h.backend.calls("extract_all"), 2);
}

// ---------------------------------------------------------------------------
// Cache-first startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restart_serves_collections_from_cache_without_network() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.reset_calls();

    let reopened = h.reopen();
    reopened.load_from_cache();

    assert_eq!(h.backend.total_calls(), 0);
    assert_eq!(reopened.properties().len(), 3);
    assert_eq!(reopened.persons().len(), 2);
    // derived inline, no scheduler turn needed
    assert_eq!(ids(&reopened.filtered_properties()), vec![3, 2, 1]);
    assert_eq!(reopened.filtered_persons().len(), 2);
    assert!(reopened.last_sync().is_some());
}

#[tokio::test]
async fn stale_collections_are_dropped_but_filters_survive() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.update_filters(PropertyFilterPatch {
        zone: Some(Some("Vasastan".into())),
        ..PropertyFilterPatch::default()
    });
    h.clock.advance(chrono::Duration::hours(25));

    let reopened = h.reopen();
    reopened.load_from_cache();

    assert!(reopened.properties().is_empty());
    assert_eq!(reopened.filters().zone.as_deref(), Some("Vasastan"));
}

#[tokio::test]
async fn bootstrap_shows_cache_then_replaces_it_with_server_data() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.edit(|data| data.properties.push(property(4, "Östermalm")));

    let reopened = h.reopen();
    let handle = reopened.start();
    assert_eq!(reopened.properties().len(), 3);

    assert_eq!(handle.await.unwrap(), LoadStatus::Loaded);
    assert_eq!(reopened.properties().len(), 4);
}

#[tokio::test]
async fn malformed_cached_locations_fall_back() {
    let h = Harness::sample();
    let envelope = serde_json::json!({
        "value": [
            {"id": 1, "type": "house", "location": {"latitude": "abc", "longitude": 18.0}},
            {"id": 2, "type": "villa", "location": null},
            {"id": 3, "type": "land", "location": "59.40,17.95"}
        ],
        "written_at": h.clock.now(),
        "schema_version": 1
    });
    h.storage.insert_raw(CacheKey::Properties.as_str(), &envelope.to_string());

    h.store.load_from_cache();

    let properties = h.store.properties();
    assert_eq!(properties.len(), 3);
    assert_eq!(properties[0].location, FALLBACK_LOCATION);
    assert_eq!(properties[1].location, FALLBACK_LOCATION);
    assert_eq!(properties[2].location, Location::new(59.40, 17.95));
}

#[tokio::test]
async fn non_finite_server_locations_fall_back() {
    let mut data = sample_data();
    data.properties[0].location = Location {
        latitude: f64::NAN,
        longitude: f64::INFINITY,
    };
    let h = Harness::new(MockBackend::with_data(data));

    h.store.load_all_data().await;

    for property in h.store.properties() {
        assert!(property.location.latitude.is_finite());
        assert!(property.location.longitude.is_finite());
    }
    assert_eq!(h.store.property(1).unwrap().location, FALLBACK_LOCATION);
}

// ---------------------------------------------------------------------------
// Detail bundles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn detail_load_merges_without_duplicates() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    let first = h.store.load_property_details(1).await.unwrap();
    assert_eq!(first.persons.len(), 2);
    h.store.cache().forget_detail(CacheKey::PropertyDetails, 1);
    h.store.load_property_details(1).await.unwrap();
    h.store.load_person_details(10).await.unwrap();

    assert_eq!(h.backend.calls("properties.get_by_id"), 2);
    assert_eq!(h.store.properties().len(), 3);
    assert_eq!(h.store.persons().len(), 2);
    assert_eq!(h.store.connections().len(), 3);
    assert_eq!(h.store.links().len(), 3);
}

#[tokio::test]
async fn concurrent_detail_loads_share_one_request() {
    let h = Harness::sample();
    h.backend.set_latency(Duration::from_millis(20));

    let (a, b) = tokio::join!(h.store.load_property_details(2), h.store.load_property_details(2));

    assert_eq!(a, b);
    assert!(a.is_some());
    assert_eq!(h.backend.calls("properties.get_by_id"), 1);
}

#[tokio::test]
async fn cached_detail_bundle_skips_the_network() {
    let h = Harness::sample();
    h.store.load_property_details(1).await.unwrap();

    let reopened = h.reopen();
    let details = reopened.load_property_details(1).await.unwrap();

    assert_eq!(h.backend.calls("properties.get_by_id"), 1);
    assert_eq!(details.links.len(), 2);
    assert_eq!(reopened.links_for_property(1).len(), 2);
    assert_eq!(reopened.persons_for_property(1).len(), 2);
}

#[tokio::test]
async fn detail_owned_edges_are_replaced_wholesale() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    // server dropped one of property 1's connections
    h.backend.edit(|data| data.connections.retain(|c| c.id != 101));

    h.store.load_property_details(1).await.unwrap();

    let edges: Vec<i64> = h.store.connections_for_property(1).iter().map(|c| c.id).collect();
    assert_eq!(edges, vec![100]);
    // the person stays even though the edge went away
    assert!(h.store.person(11).is_some());
}

#[tokio::test]
async fn updating_a_property_evicts_its_cached_bundle() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.load_property_details(1).await.unwrap();

    let mut edited = h.store.property(1).unwrap();
    edited.note = "Needs renovation".into();
    h.store.update_property(edited).await.unwrap();
    let details = h.store.load_property_details(1).await.unwrap();

    assert_eq!(h.backend.calls("properties.get_by_id"), 2);
    assert_eq!(details.property.note, "Needs renovation");
}

#[tokio::test]
async fn old_detail_bundle_expires_while_newer_ones_are_written() {
    let h = Harness::sample();
    h.store.load_property_details(1).await.unwrap();
    h.clock.advance(chrono::Duration::hours(20));
    h.store.load_property_details(2).await.unwrap();
    h.clock.advance(chrono::Duration::hours(20));

    h.store.load_property_details(1).await.unwrap();
    h.store.load_property_details(2).await.unwrap();

    // bundle 1 is 40h old and refetched, bundle 2 is 20h old and served from cache
    assert_eq!(h.backend.calls("properties.get_by_id"), 3);
}

#[tokio::test]
async fn connection_mutations_evict_the_property_bundle() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    assert_eq!(h.store.load_property_details(1).await.unwrap().connections.len(), 2);

    let created = h.store.create_connection(connection(0, 1, 11)).await.unwrap();
    let details = h.store.load_property_details(1).await.unwrap();
    assert_eq!(details.connections.len(), 3);
    assert_eq!(h.backend.calls("properties.get_by_id"), 2);

    h.store.delete_connection(created.id).await.unwrap();
    let details = h.store.load_property_details(1).await.unwrap();
    assert_eq!(details.connections.len(), 2);
    assert_eq!(h.backend.calls("properties.get_by_id"), 3);
    assert!(h.store.connections().iter().all(|c| c.id != created.id));
}

#[tokio::test]
async fn moving_a_connection_evicts_both_property_bundles() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.load_property_details(1).await.unwrap();
    h.store.load_property_details(3).await.unwrap();

    h.store.update_connection(connection(101, 3, 11)).await.unwrap();

    let old_owner = h.store.load_property_details(1).await.unwrap();
    let new_owner = h.store.load_property_details(3).await.unwrap();
    assert_eq!(h.backend.calls("properties.get_by_id"), 4);
    assert_eq!(old_owner.connections.len(), 1);
    assert_eq!(new_owner.connections.len(), 1);
    assert_eq!(h.store.connections_for_property(3)[0].id, 101);
}

#[tokio::test]
async fn link_mutations_evict_the_property_bundle() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.load_property_details(1).await.unwrap();

    h.store.update_link(link(200, 1, "hemnet.se/bostad/99")).await.unwrap();
    let details = h.store.load_property_details(1).await.unwrap();
    assert_eq!(h.backend.calls("properties.get_by_id"), 2);
    assert!(details.links.iter().any(|l| l.link == "https://hemnet.se/bostad/99"));

    h.store.delete_link(200).await.unwrap();
    let details = h.store.load_property_details(1).await.unwrap();
    assert_eq!(h.backend.calls("properties.get_by_id"), 3);
    assert_eq!(details.links.len(), 1);
    assert_eq!(h.store.links_for_property(1).len(), 1);
}

#[tokio::test]
async fn missing_detail_reports_not_found() {
    let h = Harness::sample();

    assert!(h.store.load_person_details(404).await.is_none());

    let error = h.store.error().unwrap();
    assert!(error.contains("persons 404 not found"), "{error}");
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_appends_with_server_id_and_reconciles() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    let created = h
        .store
        .create_person(person(0, "Sara Holm"))
        .await
        .unwrap();

    assert_eq!(created.id, 203);
    assert_eq!(h.store.person(203).unwrap().name, "Sara Holm");
    assert!(!h.store.loading().creating);
    eventually("reconciling refresh", || h.backend.calls("extract_all") == 2).await;
}

#[tokio::test]
async fn create_link_normalizes_the_url() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    let created = h.store.create_link(link(0, 3, "hemnet.se/bostad/1")).await.unwrap();

    assert_eq!(created.link, "https://hemnet.se/bostad/1");
    assert_eq!(h.backend.data().links.last().unwrap().link, "https://hemnet.se/bostad/1");
}

#[tokio::test]
async fn rejected_create_leaves_state_unchanged() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.reject("properties.create");

    let result = h.store.create_property(property(0, "Solna")).await;

    assert_eq!(
        result,
        Err(StoreError::Api(ApiError::Rejected {
            resource: "properties",
            action: "create",
        }))
    );
    assert_eq!(h.store.properties().len(), 3);
    assert!(h.store.error().unwrap().starts_with("Failed to create properties"));
}

#[tokio::test]
async fn failed_update_leaves_state_unchanged() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.fail("properties.update");

    let mut edited = h.store.property(2).unwrap();
    edited.rating = 4;
    let result = h.store.update_property(edited).await;

    assert!(matches!(result, Err(StoreError::Api(ApiError::Status { status: 500, .. }))));
    assert_eq!(h.store.property(2).unwrap().rating, 0);
    assert!(!h.store.loading().updating);
    assert!(h.store.error().unwrap().starts_with("Failed to update properties"));
}

#[tokio::test]
async fn update_of_unloaded_entity_does_not_append() {
    let h = Harness::sample();

    h.store.update_person(person(10, "Anna Renamed")).await.unwrap();

    assert!(h.store.persons().is_empty());
    assert_eq!(h.backend.data().persons[0].name, "Anna Renamed");
}

#[tokio::test]
async fn update_refreshes_the_selected_entity() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.select_person(Some(11));

    let mut edited = h.store.person(11).unwrap();
    edited.role = PersonRole::Owner;
    h.store.update_person(edited).await.unwrap();

    let selection = h.store.selection();
    assert_eq!(selection.person.unwrap().role, PersonRole::Owner);
    assert!(selection.person_panel_open);
}

#[tokio::test]
async fn deleting_a_property_cascades_to_its_edges() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.select_property(Some(1));

    h.store.delete_property(1).await.unwrap();

    assert!(h.store.property(1).is_none());
    assert!(h.store.connections().iter().all(|c| c.property_id != 1));
    assert!(h.store.links().iter().all(|l| l.property_id != 1));
    assert_eq!(h.store.persons().len(), 2);
    assert_eq!(h.store.connections().len(), 1);

    let server = h.backend.data();
    assert!(server.connections.iter().all(|c| c.property_id != 1));
    assert!(server.links.iter().all(|l| l.property_id != 1));

    let selection = h.store.selection();
    assert!(selection.property.is_none());
    assert!(!selection.property_panel_open);
}

#[tokio::test]
async fn deleting_a_person_keeps_properties() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    h.store.delete_person(10).await.unwrap();

    assert!(h.store.person(10).is_none());
    assert!(h.store.connections().iter().all(|c| c.person_id != 10));
    assert_eq!(h.store.properties().len(), 3);
    assert_eq!(h.backend.calls("connections.delete_by_person_id"), 1);
}

#[tokio::test]
async fn failed_cascade_stops_before_the_primary_delete() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.fail("connections.delete_by_property_id");

    assert!(h.store.delete_property(2).await.is_err());

    assert_eq!(h.backend.calls("links.delete_by_property_id"), 0);
    assert_eq!(h.backend.calls("properties.delete"), 0);
    assert!(h.store.property(2).is_some());
    assert_eq!(h.store.connections_for_property(2).len(), 1);
}

#[tokio::test]
async fn failed_primary_delete_drops_edges_and_reconciles() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.backend.fail("properties.delete");

    let result = h.store.delete_property(1).await;

    assert!(result.is_err());
    assert!(h.store.property(1).is_some());
    assert!(h.store.connections_for_property(1).is_empty());
    assert!(h.store.links_for_property(1).is_empty());
    assert!(h.store.error().unwrap().starts_with("Failed to delete property"));

    eventually("reconciling refresh", || h.backend.calls("extract_all") == 2).await;
    settle().await;
    assert!(h.store.property(1).is_some());
    assert!(h.store.connections_for_property(1).is_empty());
}

#[tokio::test]
async fn create_then_delete_property_end_to_end() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    let draft = Property {
        price_min: 40.0,
        price_max: 40.0,
        size_min: 100.0,
        size_max: 120.0,
        ..Property::default()
    };
    let created = h.store.create_property(draft).await.unwrap();
    h.store
        .create_connection(connection(0, created.id, 11))
        .await
        .unwrap();
    settle().await;

    assert_eq!(created.location, FALLBACK_LOCATION);
    let filtered = h.store.filtered_properties();
    assert_eq!(filtered.first().map(|p| p.id), Some(created.id));
    assert_eq!(h.store.connections_for_property(created.id).len(), 1);

    h.store.delete_property(created.id).await.unwrap();
    settle().await;

    assert!(h.store.property(created.id).is_none());
    assert!(h.store.connections().iter().all(|c| c.property_id != created.id));
    assert!(h.store.filtered_properties().iter().all(|p| p.id != created.id));
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

#[tokio::test]
async fn setter_bursts_coalesce_into_one_derivation() {
    let h = Harness::sample();
    let data = sample_data();

    h.store.set_properties(data.properties.clone());
    h.store.set_properties(data.properties[..2].to_vec());
    h.store.set_persons(data.persons.clone());
    h.store.set_connections(data.connections.clone());

    // nothing derived until the scheduler gets a turn
    assert_eq!(h.store.derivation_counts().properties, 0);
    assert!(h.store.filtered_properties().is_empty());

    settle().await;

    let counts = h.store.derivation_counts();
    assert_eq!(counts.properties, 1);
    assert_eq!(counts.persons, 1);
    assert_eq!(ids(&h.store.filtered_properties()), vec![2, 1]);
}

#[tokio::test(flavor = "current_thread")]
async fn every_setter_burst_derives_exactly_once() {
    let h = Harness::sample();
    let data = sample_data();

    for burst in 1..=20u64 {
        for _ in 0..50 {
            h.store.set_properties(data.properties.clone());
        }
        settle().await;
        assert_eq!(h.store.derivation_counts().properties, burst);
    }
}

#[tokio::test]
async fn filters_persist_and_rederive() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    h.store.update_filters(PropertyFilterPatch {
        search_query: Some("erik".into()),
        sort_by: Some(SortBy::Oldest),
        ..PropertyFilterPatch::default()
    });
    settle().await;
    assert_eq!(ids(&h.store.filtered_properties()), vec![1]);

    let reopened = h.reopen();
    reopened.load_from_cache();
    assert_eq!(reopened.filters().search_query, "erik");
    assert_eq!(ids(&reopened.filtered_properties()), vec![1]);

    h.store.reset_filters();
    settle().await;
    assert_eq!(ids(&h.store.filtered_properties()), vec![3, 2, 1]);
}

#[tokio::test]
async fn person_filters_use_connections() {
    let h = Harness::sample();
    h.store.load_all_data().await;
    h.store.create_person(person(0, "Lone Wolf")).await.unwrap();

    h.store.update_person_filters(PersonFilterPatch {
        has_properties: Some(Some(false)),
        ..PersonFilterPatch::default()
    });
    settle().await;

    let names: Vec<String> = h.store.filtered_persons().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Lone Wolf".to_string()]);

    h.store.reset_person_filters();
    settle().await;
    assert_eq!(h.store.filtered_persons().len(), 3);
}

#[tokio::test]
async fn relationship_queries_follow_connections() {
    let h = Harness::sample();
    h.store.load_all_data().await;

    let persons: Vec<i64> = h.store.persons_for_property(1).iter().map(|p| p.id).collect();
    let properties: Vec<i64> = h.store.properties_for_person(10).iter().map(|p| p.id).collect();

    assert_eq!(persons, vec![10, 11]);
    assert_eq!(properties, vec![1, 2]);
    assert!(h.store.persons_for_property(3).is_empty());
}
