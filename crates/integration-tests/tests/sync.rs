//! Integration tests for push, poll fallback and stale responses.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use mineiro_core::Table;
use mineiro_engine::SyncOutcome;
use mineiro_engine::api::{ChangeEvent, ChangeEventType};
use mineiro_integration_tests::{
    Document, FakeBackend, FakeFeed, admin_session, page, pizzeria, session_with, text_of,
};
use serde_json::json;

fn product_update(record: serde_json::Value) -> ChangeEvent {
    ChangeEvent {
        table: Table::Productos,
        event_type: ChangeEventType::Update,
        record,
    }
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pushed_change_updates_only_its_row() {
    let (doc, ids) = page(&[
        ("span", "producto-bebida.precio", "$0"),
        ("span", "producto-napo.precio.fam", "$0"),
        ("h1", "hero.titulo", "Bienvenido"),
    ]);
    let backend = FakeBackend::new(pizzeria());
    let feed = FakeFeed::new(true);
    let session = session_with(&backend, doc, None, Some(feed.clone()));
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(feed.subscriptions(), 1);

    // The page text of an unrelated element is changed behind the engine's
    // back; a push for another row must not rewrite it.
    session.with_document(|doc| doc.set_text_content(ids[2], "Texto local"));

    assert!(
        feed.push(product_update(
            json!({"id": 9, "dom_id": "bebida", "nombre": "Bebida", "precio": 2490})
        ))
        .await
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("$2.490"));
    assert_eq!(text_of(&session, ids[1]).as_deref(), Some("$12.990"));
    assert_eq!(text_of(&session, ids[2]).as_deref(), Some("Texto local"));

    // While the channel is up nothing is polled.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.fetches(), 1);
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_pushed_delete_removes_row() {
    let (doc, ids) = page(&[("span", "producto-bebida.nombre", "Jugo")]);
    let backend = FakeBackend::new(pizzeria());
    let feed = FakeFeed::new(true);
    let session = session_with(&backend, doc, None, Some(feed.clone()));
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    feed.push(ChangeEvent {
        table: Table::Productos,
        event_type: ChangeEventType::Delete,
        record: json!({"id": 9}),
    })
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let products = session.data().unwrap().products;
    assert!(products.iter().all(|p| !p.id.matches("9")));
    // Nothing resolves any more, so the last value stays on the page.
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Bebida"));
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_pushed_store_change_can_suspend() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let feed = FakeFeed::new(true);
    let session = session_with(&backend, doc, None, Some(feed.clone()));
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    feed.push(ChangeEvent {
        table: Table::Tiendas,
        event_type: ChangeEventType::Update,
        record: json!({"estado_pago": false}),
    })
    .await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!session.status().unwrap().is_operational());
    let banners = session.with_document(|doc| doc.query_attribute("data-mineiro-banner"));
    assert_eq!(banners.len(), 1);
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Hola"));
    session.shutdown();
}

// =============================================================================
// Poll fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_feed_falls_back_to_polling() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let feed = FakeFeed::new(false);
    let session = session_with(&backend, doc, None, Some(feed.clone()));
    session.start().await.unwrap();

    backend.update(|s| s.store.set_config_value("hero.titulo", json!("Nuevo menú")));

    // Confirmation timeout plus one poll interval.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(feed.subscriptions(), 1);
    assert!(backend.fetches() >= 2);
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Nuevo menú"));
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_closed_feed_falls_back_to_polling() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let feed = FakeFeed::new(true);
    let session = session_with(&backend, doc, None, Some(feed.clone()));
    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    feed.close();
    backend.update(|s| s.store.set_config_value("hero.titulo", json!("Cerrado por vacaciones")));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(
        text_of(&session, ids[0]).as_deref(),
        Some("Cerrado por vacaciones")
    );
    session.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_poll_without_changes_does_not_rehydrate() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let session = admin_session(&backend, doc);
    session.refresh().await.unwrap();

    session.with_document(|doc| doc.set_text_content(ids[0], "Editado a mano"));
    assert_eq!(session.poll_once().await, Some(SyncOutcome::Unchanged));
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Editado a mano"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_keeps_previous_snapshot() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let session = admin_session(&backend, doc);
    session.refresh().await.unwrap();

    backend.fail_fetches(true);
    assert_eq!(session.poll_once().await, None);
    assert!(session.data().is_some());
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Hola"));
}

#[tokio::test]
async fn test_failed_start_spawns_nothing() {
    let (doc, _) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    backend.fail_fetches(true);
    let session = admin_session(&backend, doc);

    assert!(session.start().await.is_err());
    assert!(session.data().is_none());
    assert_eq!(session.hydrate().applied, 0);
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_response_is_dropped() {
    let (doc, ids) = page(&[("h1", "hero.titulo", "Bienvenido")]);
    let backend = FakeBackend::new(pizzeria());
    let session = admin_session(&backend, doc);
    session.refresh().await.unwrap();

    let mut old = pizzeria();
    old.store.set_config_value("hero.titulo", json!("Viejo"));
    let mut new = pizzeria();
    new.store.set_config_value("hero.titulo", json!("Nuevo"));
    backend.script_fetch(Duration::from_secs(2), old);
    backend.script_fetch(Duration::ZERO, new);

    // The first fetch is slow and answers after the second one.
    let (first, second) = tokio::join!(session.refresh(), session.refresh());
    assert_eq!(first.unwrap(), SyncOutcome::Stale);
    assert!(matches!(second.unwrap(), SyncOutcome::Updated(_)));
    assert_eq!(text_of(&session, ids[0]).as_deref(), Some("Nuevo"));
}
