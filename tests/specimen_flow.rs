use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use herbarium::error::Error;
use herbarium::specimen::{
    ConservationStatus, Fetched, Location, NewSpecimen, Specimen, SpecimenAccess, SpecimenPatch,
};
use herbarium::store::{DocumentStore, MemoryStore};
use serde_json::json;

fn orchid(researcher: &str) -> NewSpecimen {
    NewSpecimen {
        scientific_name: "Ophrys apifera".to_string(),
        common_name: "Bee orchid".to_string(),
        family: "Orchidaceae".to_string(),
        genus: "Ophrys".to_string(),
        collector: "A. Lima".to_string(),
        collection_date: "2024-03-15".to_string(),
        researcher_id: Some(researcher.to_string()),
        location: Location {
            country: "UK".to_string(),
            state: "Kent".to_string(),
            city: "Dover".to_string(),
            coordinates: None,
        },
        conservation_status: ConservationStatus::Vulnerable,
        ..Default::default()
    }
}

async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Fetched<Vec<Specimen>>>) -> Vec<Specimen> {
    let snapshot = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("snapshot should arrive")
        .expect("listener still running");
    assert!(snapshot.is_ok(), "unexpected failure: {:?}", snapshot.failure);
    snapshot.value
}

#[tokio::test]
async fn subscription_follows_writes_until_unsubscribed() {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = access.subscribe_all_specimens(move |snapshot| {
        let _ = tx.send(snapshot);
    });

    assert!(next_snapshot(&mut rx).await.is_empty());

    let id = access.add_specimen(orchid("u-1")).await.unwrap();
    let snapshot = next_snapshot(&mut rx).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, id);

    access
        .update_specimen(
            &id,
            SpecimenPatch {
                conservation_status: Some(ConservationStatus::Endangered),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut rx).await;
    assert_eq!(snapshot[0].conservation_status, ConservationStatus::Endangered);

    subscription.unsubscribe().await;
    access.add_specimen(orchid("u-2")).await.unwrap();
    // The sender lived in the callback, so the channel closes with the listener
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn user_subscription_sees_records_leave() {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let mine = access.add_specimen(orchid("u-1")).await.unwrap();
    access.add_specimen(orchid("u-2")).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = access.subscribe_user_specimens("u-1", move |snapshot| {
        let _ = tx.send(snapshot);
    });
    assert_eq!(next_snapshot(&mut rx).await.len(), 1);

    access.delete_specimen(&mine).await.unwrap();
    assert!(next_snapshot(&mut rx).await.is_empty());
    subscription.unsubscribe().await;
}

#[tokio::test]
async fn archive_moves_record_out_of_the_catalog() {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let id = access.add_specimen(orchid("u-1")).await.unwrap();

    access
        .archive_specimen(&id, "admin-1", "Duplicate sheet")
        .await
        .unwrap();

    assert!(access.get_specimen(&id).await.unwrap().is_none());
    let archived = access.list_archived(10).await;
    assert!(archived.is_ok());
    assert_eq!(archived.value.len(), 1);
    assert_eq!(archived.value[0].specimen.id, id);
    assert_eq!(archived.value[0].reason, "Duplicate sheet");

    assert!(matches!(
        access.delete_specimen(&id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn form_validation_is_separate_from_storage() {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let draft = NewSpecimen {
        family: String::new(),
        ..orchid("u-1")
    };
    match draft.validate() {
        Err(Error::Validation(fields)) => assert_eq!(fields[0].field, "family"),
        other => panic!("Expected validation error, got {:?}", other),
    }

    // The access layer stores whatever the form hands it
    let id = access.add_specimen(draft).await.unwrap();
    let stored = access.get_specimen(&id).await.unwrap().unwrap();
    assert_eq!(stored.family, "");
    assert!(stored.created_at.is_some());
}

#[tokio::test]
async fn rows_with_null_columns_still_load() {
    let store = Arc::new(MemoryStore::new());
    let access = SpecimenAccess::new(Arc::clone(&store));
    access.add_specimen(orchid("u-1")).await.unwrap();
    store
        .insert(
            "specimens",
            json!({
                "id": "legacy-1",
                "scientificName": "Bellis perennis",
                "family": "Asteraceae",
                "commonName": null,
                "imageUrl": null,
                "notes": null,
                "habitat": null,
                "location": { "country": "UK", "state": null, "city": null },
                "conservationStatus": null
            }),
        )
        .await
        .unwrap();

    let all = access.get_all_specimens().await;
    assert!(all.is_ok(), "unexpected failure: {:?}", all.failure);
    assert_eq!(all.value.len(), 2);

    let legacy = access.get_specimen("legacy-1").await.unwrap().unwrap();
    assert_eq!(legacy.family, "Asteraceae");
    assert!(legacy.notes.is_empty());
    assert_eq!(legacy.location.country, "UK");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_listener_resyncs_after_missing_changes() {
    // Change notifications buffered per listener before it starts lagging
    const CHANNEL_CAPACITY: usize = 64;
    const INSERTS: usize = CHANNEL_CAPACITY + 36;

    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let mut stalled = true;
    let subscription = access.subscribe_all_specimens(move |snapshot| {
        let _ = tx.send(snapshot);
        if stalled {
            stalled = false;
            let _ = release_rx.recv();
        }
    });

    assert!(next_snapshot(&mut rx).await.is_empty());
    for _ in 0..INSERTS {
        access.add_specimen(orchid("u-1")).await.unwrap();
    }
    release_tx.send(()).unwrap();

    // One resync for the missed changes, then one per change still buffered
    let resync = next_snapshot(&mut rx).await;
    assert_eq!(resync.len(), INSERTS);
    for _ in 0..CHANNEL_CAPACITY {
        assert_eq!(next_snapshot(&mut rx).await.len(), INSERTS);
    }

    subscription.unsubscribe().await;
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn dropping_the_subscription_stops_delivery() {
    let access = SpecimenAccess::new(Arc::new(MemoryStore::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = access.subscribe_all_specimens(move |snapshot| {
        let _ = tx.send(snapshot);
    });
    assert!(next_snapshot(&mut rx).await.is_empty());

    drop(subscription);
    access.add_specimen(orchid("u-1")).await.unwrap();

    let closed = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("channel should close once the listener is gone");
    assert!(closed.is_none());
}
