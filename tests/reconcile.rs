use crone_ingest::domain::{Component, CoordinateUnits, StationRecord};
use crone_ingest::parser::MeasurementCandidate;
use crone_ingest::reconcile::{
    DerivedDistance, ExactLabel, NearestDistance, Reconciler, StationMatcher, channel_samples,
};

fn station(id: u64, distance: f64) -> StationRecord {
    StationRecord {
        id,
        survey_id: 1,
        sequence: id as u32,
        label: format!("{distance}N"),
        line_id: None,
        easting: 0.0,
        northing: 0.0,
        elevation: 0.0,
        units: CoordinateUnits::Metres,
        distance,
    }
}

fn profile() -> Vec<StationRecord> {
    vec![
        station(1, 0.0),
        station(2, 25.0),
        station(3, 50.0),
        station(4, 75.0),
    ]
}

fn candidate(label: &str, component: Component, channels: Vec<f64>) -> MeasurementCandidate {
    MeasurementCandidate {
        station_label: label.to_string(),
        receiver_code: "ZR10R".to_string(),
        receiver_number: 1,
        instrument: "A".to_string(),
        angle: 90.0,
        num_samples: Some(256),
        component,
        parameters: None,
        primary_pulse: 100.0,
        channels,
    }
}

#[test]
fn nearest_distance_within_tolerance() {
    let reconciler = Reconciler::new(50.0);
    let stations = profile();

    let (by, matched) = reconciler.match_station("26N", &stations).unwrap();
    assert_eq!(by, "nearest");
    assert_eq!(matched.distance, 25.0);

    assert!(reconciler.match_station("200N", &stations).is_none());
}

#[test]
fn tolerance_is_configurable() {
    let stations = profile();
    assert!(Reconciler::new(1.0).match_station("30N", &stations).is_none());
    assert_eq!(
        Reconciler::new(10.0)
            .match_station("30N", &stations)
            .map(|(_, station)| station.id),
        Some(2)
    );
}

#[test]
fn strategies_run_in_fixed_order() {
    let mut stations = profile();
    stations[0].label = "50N".to_string();
    let reconciler = Reconciler::default();
    let (by, matched) = reconciler.match_station("50N", &stations).unwrap();
    assert_eq!(by, "label");
    assert_eq!(matched.id, 1);

    let only_distance = Reconciler::with_matchers(vec![Box::new(DerivedDistance)]);
    let (by, matched) = only_distance.match_station("50N", &stations).unwrap();
    assert_eq!(by, "distance");
    assert_eq!(matched.id, 3);
}

#[test]
fn strategies_are_usable_alone() {
    let stations = profile();
    assert_eq!(ExactLabel.name(), "label");
    assert!(ExactLabel.try_match("L25N", &stations).is_none());
    let nearest = NearestDistance { tolerance: 5.0 };
    assert!(nearest.try_match("L25N", &stations).is_none());
    assert_eq!(nearest.try_match("73N", &stations).map(|s| s.id), Some(4));
}

#[test]
fn channels_truncate_to_shorter_sequence() {
    let gates: Vec<f64> = (1..=13).map(|gate| gate as f64 * 1e-5).collect();
    let amplitudes: Vec<f64> = (1..=10).map(|value| value as f64).collect();
    let samples = channel_samples(&gates, &amplitudes);
    assert_eq!(samples.len(), 10);
    let indices: Vec<u32> = samples.iter().map(|sample| sample.channel).collect();
    assert_eq!(indices, (1..=10).collect::<Vec<u32>>());
    assert_eq!(samples[9].time_offset, gates[9]);
}

#[test]
fn reconcile_partitions_candidates() {
    let stations = profile();
    let candidates = vec![
        candidate("0N", Component::Z, vec![1.0, 2.0]),
        candidate("0N", Component::Z, vec![1.0, 2.0]),
        candidate("25N", Component::X, vec![3.0]),
        candidate("50N", Component::Y, vec![4.0]),
        candidate("500N", Component::Z, vec![5.0]),
    ];
    let reconciler = Reconciler::default();
    let result = reconciler.reconcile(&candidates, &stations, &[0.1, 0.2, 0.3], |station_id, component| {
        station_id == 3 && component == Component::Y
    });

    assert_eq!(result.to_insert.len(), 2);
    assert_eq!(result.to_insert[0].station_id, 1);
    assert_eq!(result.to_insert[0].channels.len(), 2);
    assert_eq!(result.to_insert[1].station_id, 2);
    assert_eq!(result.duplicates.len(), 2);
    assert_eq!(result.not_found, vec!["500N".to_string()]);
}
