use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use smap_core::{
    AddOptions, ConfigError, Container, ContainerProblem, EngineCall, HeadlessEngine, LatLng,
    LatLngBounds, LayerId, MapConfig, MapManager, MarkerSpec, OverlayEvent, REVEAL_DELAY,
    RevealFollowUp, ShapeSpec, SourceTrigger,
};

fn config(v: Value) -> MapConfig {
    serde_json::from_value(v).unwrap()
}

fn mount_with(engine: HeadlessEngine, v: Value) -> MapManager<HeadlessEngine> {
    MapManager::initialize(engine, Some(&Container::with_id("map")), config(v)).unwrap()
}

fn clustered() -> MapManager<HeadlessEngine> {
    mount_with(HeadlessEngine::new(), json!({ "map": { "center": [48.85, 2.35] } }))
}

fn direct() -> MapManager<HeadlessEngine> {
    mount_with(
        HeadlessEngine::new(),
        json!({ "map": { "center": [48.85, 2.35] }, "enableClusters": false }),
    )
}

fn markers(points: &[(f64, f64)]) -> Vec<MarkerSpec> {
    points.iter().map(|&(lat, lng)| MarkerSpec::at(LatLng::new(lat, lng))).collect()
}

fn marker(v: Value) -> MarkerSpec {
    serde_json::from_value(v).unwrap()
}

fn shape(v: Value) -> ShapeSpec {
    serde_json::from_value(v).unwrap()
}

fn layers(m: &MapManager<HeadlessEngine>, group: &str) -> Vec<LayerId> {
    m.get_group(group).unwrap().member_layers()
}

fn fits(m: &MapManager<HeadlessEngine>) -> Vec<(LatLngBounds, [f64; 2])> {
    m.engine()
        .calls()
        .iter()
        .filter_map(|c| match c {
            EngineCall::FitBounds { bounds, padding } => Some((*bounds, *padding)),
            _ => None,
        })
        .collect()
}

fn invalidations(m: &MapManager<HeadlessEngine>) -> usize {
    m.engine().count_calls(|c| *c == EngineCall::InvalidateSize)
}

#[test]
fn container_without_id_is_rejected() {
    let err = MapManager::initialize(
        HeadlessEngine::new(),
        Some(&Container::default()),
        config(json!({ "map": { "center": [1, 1] } })),
    )
    .err()
    .unwrap();
    assert_eq!(err, ConfigError::InvalidContainer(ContainerProblem::MissingId));

    let err = MapManager::initialize(HeadlessEngine::new(), None, config(json!({ "map": { "center": [1, 1] } })))
        .err()
        .unwrap();
    assert_eq!(err, ConfigError::InvalidContainer(ContainerProblem::NotFound));
}

#[test]
fn initialization_checks_engine_center_and_cluster_library() {
    let centered = json!({ "map": { "center": [1, 1] } });
    let err = MapManager::initialize(
        HeadlessEngine::new().without_engine(),
        Some(&Container::with_id("map")),
        config(centered.clone()),
    )
    .err()
    .unwrap();
    assert_eq!(err, ConfigError::MissingEngine);

    let err = MapManager::initialize(HeadlessEngine::new(), Some(&Container::with_id("map")), MapConfig::default())
        .err()
        .unwrap();
    assert_eq!(err, ConfigError::MissingCenter);

    let err = MapManager::initialize(
        HeadlessEngine::new().without_cluster_library(),
        Some(&Container::with_id("map")),
        config(centered),
    )
    .err()
    .unwrap();
    assert_eq!(err, ConfigError::MissingClusterLibrary);

    let m = mount_with(
        HeadlessEngine::new().without_cluster_library(),
        json!({ "map": { "center": [1, 1] }, "enableClusters": false }),
    );
    assert!(!m.is_clustering());
}

#[test]
fn empty_batch_creates_nothing_and_skips_update() {
    let mut m = clustered();
    let before = invalidations(&m);
    m.add_markers(Vec::new(), AddOptions::default(), "poi");
    m.add_shapes(Vec::new(), AddOptions::default(), "zones");
    assert!(m.groups().is_empty());
    assert!(!m.is_clustering());
    assert_eq!(invalidations(&m), before);
}

#[test]
fn clustered_markers_join_the_cluster_not_the_group_layer() {
    let mut m = clustered();
    m.add_markers(markers(&[(48.0, 2.0), (49.0, 3.0)]), AddOptions::default(), "poi");

    let group = m.get_group("poi").unwrap();
    assert_eq!(group.kind().as_str(), "marker_clustered");
    assert!(m.engine().group_children(group.layer()).is_empty());

    let cluster = m.cluster().unwrap();
    assert_eq!(cluster.registered().collect::<Vec<_>>(), layers(&m, "poi"));
    assert_eq!(m.engine().cluster_members(cluster.handle()), layers(&m, "poi"));
}

#[test]
fn remove_group_only_unregisters_its_own_members() {
    let mut m = clustered();
    m.add_markers(markers(&[(48.0, 2.0), (49.0, 3.0)]), AddOptions::default(), "a");
    m.add_markers(markers(&[(47.0, 1.0)]), AddOptions::default(), "b");
    let b = layers(&m, "b");
    let handle = m.cluster().unwrap().handle();

    m.remove_group("a", true);
    assert!(m.get_group("a").is_none());
    assert_eq!(m.cluster().unwrap().registered().collect::<Vec<_>>(), b);
    assert_eq!(m.engine().cluster_members(handle), b);

    m.remove_group("missing", true);
    assert_eq!(m.groups().len(), 1);
}

#[test]
fn remove_groups_tears_down_cluster_and_next_add_starts_fresh() {
    let mut m = clustered();
    m.add_markers(markers(&[(48.0, 2.0)]), AddOptions::default(), "a");
    m.add_markers(markers(&[(47.0, 1.0)]), AddOptions::default(), "b");
    let old = m.cluster().unwrap().handle();

    m.remove_groups(true);
    assert!(m.groups().is_empty());
    assert!(m.cluster().is_none());
    assert!(m.engine().layer(old).is_none());

    m.add_markers(markers(&[(46.0, 0.0)]), AddOptions::default(), "c");
    let fresh = m.cluster().unwrap();
    assert_ne!(fresh.handle(), old);
    assert_eq!(fresh.len(), 1);
}

#[test]
fn replace_drops_previous_members() {
    let mut m = clustered();
    m.add_markers(markers(&[(48.0, 2.0), (49.0, 3.0)]), AddOptions::default(), "poi");
    let old = layers(&m, "poi");
    m.add_markers(markers(&[(40.0, 1.0)]), AddOptions::REPLACE, "poi");

    let new = layers(&m, "poi");
    assert_eq!(new.len(), 1);
    assert!(old.iter().all(|l| m.engine().layer(*l).is_none()));
    assert_eq!(m.cluster().unwrap().registered().collect::<Vec<_>>(), new);
}

#[test]
fn appending_to_an_existing_group_keeps_earlier_members() {
    let mut m = direct();
    m.add_markers(markers(&[(48.0, 2.0)]), AddOptions::default(), "poi");
    m.add_markers(markers(&[(49.0, 3.0)]), AddOptions::default(), "poi");
    let group = m.get_group("poi").unwrap();
    assert_eq!(group.len(), 2);
    assert_eq!(m.engine().group_children(group.layer()), group.member_layers());
}

#[test]
fn invalid_records_are_skipped() {
    let mut m = direct();
    let batch = vec![
        marker(json!({ "position": [48, 2] })),
        marker(json!({ "popup": "no position" })),
        marker(json!({ "position": [95, 2] })),
    ];
    m.add_markers(batch, AddOptions::default(), "poi");
    assert_eq!(m.get_group("poi").unwrap().len(), 1);
}

#[test]
fn default_icon_anchors() {
    let mut m = direct();
    m.add_markers(markers(&[(48.0, 2.0)]), AddOptions::default(), "poi");
    let icon = m.get_group("poi").unwrap().members()[0].icon().unwrap();
    assert_eq!(icon.icon_size, [50, 50]);
    assert_eq!(icon.icon_anchor, [25, 50]);
    assert_eq!(icon.popup_anchor, [0, -33]);
}

#[test]
fn camera_fits_union_of_groups_and_cluster() {
    let mut m = clustered();
    m.add_markers(markers(&[(10.0, 20.0), (12.0, 22.0)]), AddOptions::default(), "poi");
    m.add_shapes(
        vec![shape(json!({
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 40], [5, 40], [5, 45], [0, 45], [0, 40]]]
            }
        }))],
        AddOptions::default(),
        "zones",
    );

    let expected = LatLngBounds::from_corners(LatLng::new(10.0, 0.0), LatLng::new(45.0, 22.0));
    assert_eq!(m.camera_bounds(), expected);
    assert_eq!(fits(&m).last(), Some(&(expected, [30.0, 30.0])));
}

#[test]
fn shapes_added_to_a_clustered_group_count_toward_the_fit() {
    let mut m = clustered();
    m.add_markers(markers(&[(10.0, 20.0)]), AddOptions::default(), "mixed");
    m.add_shapes(
        vec![shape(json!({
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 40], [5, 40], [5, 45], [0, 45], [0, 40]]]
            }
        }))],
        AddOptions::default(),
        "mixed",
    );

    let group = m.get_group("mixed").unwrap().layer();
    assert_eq!(m.engine().group_children(group).len(), 1);

    let expected = LatLngBounds::from_corners(LatLng::new(10.0, 0.0), LatLng::new(45.0, 20.0));
    assert_eq!(m.camera_bounds(), expected);
    assert_eq!(fits(&m).last(), Some(&(expected, [30.0, 30.0])));
}

#[test]
fn no_fit_without_valid_bounds_or_auto_center() {
    let mut m = direct();
    m.update();
    m.add_markers(vec![marker(json!({ "popup": "broken" }))], AddOptions::default(), "poi");
    assert!(m.get_group("poi").unwrap().is_empty());
    assert!(fits(&m).is_empty());
    assert!(invalidations(&m) >= 2);

    let mut m = mount_with(
        HeadlessEngine::new(),
        json!({ "map": { "center": [1, 1] }, "autoCenter": false }),
    );
    m.add_markers(markers(&[(48.0, 2.0)]), AddOptions::default(), "poi");
    assert!(fits(&m).is_empty());
}

#[test]
fn custom_padding_reaches_the_engine() {
    let mut m = mount_with(
        HeadlessEngine::new(),
        json!({
            "map": { "center": [1, 1] },
            "enableClusters": false,
            "boundsOptions": { "padding": [5, 10] }
        }),
    );
    m.add_markers(markers(&[(48.0, 2.0)]), AddOptions::default(), "poi");
    assert_eq!(fits(&m).last().map(|f| f.1), Some([5.0, 10.0]));
}

#[test]
fn hover_on_source_is_debounced_through_the_manager() {
    let mut m = direct();
    let spec = marker(json!({ "position": [48, 2], "popup": "<b>Louvre</b>", "sourceContainer": "#louvre" }));
    m.add_markers(vec![spec], AddOptions::default(), "poi");
    let layer = layers(&m, "poi")[0];

    m.handle_source_trigger(layer, SourceTrigger::Activate { event: "mouseenter".into() });
    m.handle_source_trigger(layer, SourceTrigger::Leave);
    assert!(m.engine().pending_timers().is_empty());

    m.handle_source_trigger(layer, SourceTrigger::Activate { event: "mouseenter".into() });
    let (&timer, &(owner, delay)) = m.engine().pending_timers().iter().next().unwrap();
    assert_eq!((owner, delay), (layer, REVEAL_DELAY));
    assert!(!m.engine().is_popup_open(layer));

    assert_eq!(m.engine_mut().fire_timer(timer), Some(layer));
    assert!(m.run_scheduled_reveal(layer, timer));
    assert!(m.engine().is_popup_open(layer));
}

#[test]
fn reveal_zooms_through_the_cluster() {
    let mut m = clustered();
    let spec = marker(json!({ "position": [48, 2], "popup": "x" }));
    m.add_markers(vec![spec], AddOptions::default(), "poi");
    let layer = layers(&m, "poi")[0];
    let cluster = m.cluster().unwrap().handle();

    assert!(m.reveal(layer));
    assert_eq!(
        m.engine().calls().last(),
        Some(&EngineCall::ZoomToShowLayer {
            cluster,
            layer,
            then: RevealFollowUp::OpenPopup
        })
    );
    assert!(m.engine().is_popup_open(layer));
}

#[test]
fn overlay_events_route_through_the_manager() {
    let mut m = direct();
    let spec = marker(json!({ "position": [48, 2], "popup": "x", "sourceContainer": "#louvre" }));
    m.add_markers(vec![spec], AddOptions::default(), "poi");
    let layer = layers(&m, "poi")[0];

    assert!(m.handle_layer_event(layer, OverlayEvent::MouseOver));
    assert!(m.engine().has_class(layer, "is-focused"));
    assert!(m.handle_layer_event(layer, OverlayEvent::PopupOpen));
    assert!(m.engine().source_has_class("#louvre", "is-active"));
}

#[test]
fn group_removal_detaches_source_and_cancels_timers() {
    let mut m = direct();
    let spec = marker(json!({ "position": [48, 2], "popup": "x", "sourceContainer": "#louvre" }));
    m.add_markers(vec![spec], AddOptions::default(), "poi");
    let layer = layers(&m, "poi")[0];
    m.handle_source_trigger(layer, SourceTrigger::Activate { event: "focus".into() });
    assert_eq!(m.engine().pending_timers().len(), 1);

    m.remove_group("poi", false);
    assert!(m.engine().pending_timers().is_empty());
    assert!(m.engine().calls().contains(&EngineCall::UnwatchSource {
        layer,
        container: "#louvre".into()
    }));
    assert!(!m.handle_layer_event(layer, OverlayEvent::Click));
}

#[test]
fn shapes_get_classes_and_open_popups_once_attached() {
    let mut m = clustered();
    let spec = shape(json!({
        "geometry": { "type": "Point", "coordinates": [2, 48] },
        "popup": "zone",
        "popupOptions": { "showPopup": true, "attributes": { "class": "wide", "role": "dialog" } },
        "classes": { "prefix": "zone" }
    }));
    m.add_shapes(vec![spec], AddOptions::default(), "zones");

    let group = m.get_group("zones").unwrap();
    assert_eq!(group.kind().as_str(), "shape");
    let layer = group.member_layers()[0];
    assert_eq!(m.engine().group_children(group.layer()), vec![layer]);
    assert!(m.engine().has_class(layer, "zone"));
    assert!(m.engine().has_class(layer, "zone--default"));
    assert!(m.engine().is_popup_open(layer));

    let popup = m.engine().layer(layer).unwrap().popup.clone().unwrap();
    assert_eq!(popup.class_name, "wide smap-popup smap-popup--default");
    assert_eq!(popup.attributes.get("role").map(String::as_str), Some("dialog"));
    assert!(!m.cluster().is_some_and(|c| c.contains(layer)));
}
