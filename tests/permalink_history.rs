mod support;

use std::sync::{Arc, Mutex};

use choucalerte::{
    AppState, BaseLayer, Clue, History, MemoryHistory, Permalink, Projection, RelationKind, RelationParams,
    RenderUpdate, Session, Target, Viewport,
};
use support::{point_feature, unit_boundary, FakeGeometryService};

/// Records every render update it receives.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<RenderUpdate>>>);

impl Projection for Recorder {
    fn apply(&mut self, update: &RenderUpdate, _state: &AppState) {
        self.0.lock().unwrap().push(update.clone());
    }
}

fn session() -> Session {
    Session::new(Arc::new(FakeGeometryService::new())).unwrap()
}

#[tokio::test]
async fn every_visible_change_pushes_one_entry() {
    let mut session = session();
    session.set_base_layer(BaseLayer::Osm).await.unwrap();
    session
        .set_viewport(Viewport {
            zoom: 12.0,
            center: [6.123, 45.456],
        })
        .await
        .unwrap();
    assert_eq!(session.history().len(), 2);

    let fragment = &session.history().current().unwrap().fragment;
    let link = Permalink::parse(fragment).unwrap();
    assert_eq!(link.center, [6.12, 45.46]);
    assert!((link.zoom - 12.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn state_change_with_same_viewport_gets_new_fingerprint() {
    let mut session = session();
    session.set_base_layer(BaseLayer::Osm).await.unwrap();
    let before = Permalink::parse(&session.history().current().unwrap().fragment).unwrap();
    session.set_base_layer(BaseLayer::Humanitarian).await.unwrap();
    let after = Permalink::parse(&session.history().current().unwrap().fragment).unwrap();
    assert_eq!(before.center, after.center);
    assert_ne!(before.fingerprint, after.fingerprint);
}

#[tokio::test]
async fn restoring_never_appends_history() {
    let mut session = session();
    session.set_boundary(Some(unit_boundary())).await.unwrap();
    let clue = Clue::builder()
        .relation(RelationKind::ImmediateProximity)
        .target(Target::feature(point_feature(5.0, 5.0)))
        .params(RelationParams::proximity(0.0, 2.0))
        .build()
        .unwrap();
    session.add_clue(clue).await.unwrap();
    session.set_base_layer(BaseLayer::OsmFrance).await.unwrap();
    let entries = session.history().len();
    assert!(entries >= 3);

    assert!(session.back().await.unwrap());
    assert_eq!(session.state().base_layer, BaseLayer::OpenTopoMap);
    assert_eq!(session.state().clues.len(), 1);
    assert_eq!(session.history().len(), entries);

    assert!(session.back().await.unwrap());
    assert!(session.state().clues.is_empty());
    assert!(session.state().boundary.is_some());
    assert_eq!(session.history().len(), entries);

    assert!(session.forward().await.unwrap());
    assert_eq!(session.state().clues.len(), 1);
    assert!(session.forward().await.unwrap());
    assert_eq!(session.state().base_layer, BaseLayer::OsmFrance);
    assert!(!session.forward().await.unwrap());
    assert_eq!(session.history().len(), entries);
}

#[tokio::test]
async fn new_write_after_going_back_truncates_forward_entries() {
    let mut session = session();
    session.set_base_layer(BaseLayer::Osm).await.unwrap();
    session.set_base_layer(BaseLayer::Humanitarian).await.unwrap();
    session.set_base_layer(BaseLayer::Hikebike).await.unwrap();
    session.back().await.unwrap();
    session.back().await.unwrap();
    assert_eq!(session.state().base_layer, BaseLayer::Osm);

    session.set_base_layer(BaseLayer::OsmFrance).await.unwrap();
    assert_eq!(session.history().len(), 2);
    assert!(!session.forward().await.unwrap());
}

#[tokio::test]
async fn projections_receive_incremental_updates() {
    let recorder = Recorder::default();
    let mut session = Session::builder(Arc::new(FakeGeometryService::new()))
        .history(Box::new(MemoryHistory::new()))
        .projection(Box::new(recorder.clone()))
        .build()
        .unwrap();

    session.set_boundary(Some(unit_boundary())).await.unwrap();
    let clue = Clue::builder()
        .relation(RelationKind::ImmediateProximity)
        .target(Target::feature(point_feature(5.0, 5.0)))
        .params(RelationParams::proximity(0.0, 2.0))
        .build()
        .unwrap();
    let done = session.add_clue(clue).await.unwrap();

    let updates = recorder.0.lock().unwrap().clone();
    assert!(matches!(updates[0], RenderUpdate::Boundary(Some(_))));
    let RenderUpdate::Clues(diff) = &updates[1] else {
        panic!("expected a clue update, got {:?}", updates[1]);
    };
    assert_eq!(diff.added, vec![done.clue_id().clone()]);
    assert!(matches!(updates[2], RenderUpdate::ProbableZone(None)));
}
