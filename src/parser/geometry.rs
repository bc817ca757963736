use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::CoordinateUnits;

static LOOP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)<L(\d+)>([^\r\n]*)").expect("loop tag pattern"));
static STATION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)<P(\d+)>([^\r\n]*)").expect("station tag pattern"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopPoint {
    pub sequence: u32,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub units: CoordinateUnits,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationPoint {
    pub sequence: u32,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub units: CoordinateUnits,
    pub distance: f64,
}

/// A geometry tag whose fields could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedTag {
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Geometry {
    pub loops: Vec<LoopPoint>,
    pub stations: Vec<StationPoint>,
    pub malformed: Vec<MalformedTag>,
}

/// Easting, northing, elevation, units flag and, for stations, distance.
struct Fields {
    easting: f64,
    northing: f64,
    elevation: f64,
    units: CoordinateUnits,
    distance: Option<f64>,
}

fn parse_fields(rest: &str, with_distance: bool) -> Result<Fields, String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let arity = if with_distance { 5 } else { 4 };
    if tokens.len() < arity {
        return Err(format!("expected {arity} fields, found {}", tokens.len()));
    }
    let number = |index: usize, name: &str| {
        tokens[index]
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("invalid {name}: {}", tokens[index]))
    };
    let easting = number(0, "easting")?;
    let northing = number(1, "northing")?;
    let elevation = number(2, "elevation")?;
    let flag = tokens[3]
        .parse::<u8>()
        .map_err(|_| format!("invalid units flag: {}", tokens[3]))?;
    let distance = if with_distance {
        Some(number(4, "distance")?)
    } else {
        None
    };
    Ok(Fields {
        easting,
        northing,
        elevation,
        units: CoordinateUnits::from_flag(flag),
        distance,
    })
}

fn sequence(tag_prefix: char, digits: &str) -> Result<u32, String> {
    digits
        .parse::<u32>()
        .map_err(|_| format!("invalid sequence number in <{tag_prefix}{digits}>"))
}

/// Reads every `<Lnn>` transmitter vertex and `<Pnn>` receiver station in
/// source order. A tag with unreadable fields is dropped and recorded in
/// [`Geometry::malformed`]; the rest of the block is unaffected.
pub fn parse_geometry(text: &str) -> Geometry {
    let mut geometry = Geometry::default();

    for caps in LOOP_TAG.captures_iter(text) {
        let tag = format!("L{}", &caps[1]);
        let parsed = sequence('L', &caps[1])
            .and_then(|seq| parse_fields(&caps[2], false).map(|fields| (seq, fields)));
        match parsed {
            Ok((sequence, fields)) => geometry.loops.push(LoopPoint {
                sequence,
                easting: fields.easting,
                northing: fields.northing,
                elevation: fields.elevation,
                units: fields.units,
            }),
            Err(reason) => {
                tracing::warn!(tag = %tag, %reason, "dropping malformed loop vertex");
                geometry.malformed.push(MalformedTag { tag, reason });
            }
        }
    }

    for caps in STATION_TAG.captures_iter(text) {
        let tag = format!("P{}", &caps[1]);
        let parsed = sequence('P', &caps[1])
            .and_then(|seq| parse_fields(&caps[2], true).map(|fields| (seq, fields)));
        match parsed {
            Ok((sequence, fields)) => geometry.stations.push(StationPoint {
                sequence,
                easting: fields.easting,
                northing: fields.northing,
                elevation: fields.elevation,
                units: fields.units,
                distance: fields.distance.unwrap_or_default(),
            }),
            Err(reason) => {
                tracing::warn!(tag = %tag, %reason, "dropping malformed station");
                geometry.malformed.push(MalformedTag { tag, reason });
            }
        }
    }

    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loops_and_stations_in_order() {
        let text = "<L01> 500100.0 5000200.0 310.5 0\n<L00> 500000.0 5000000.0 300.0 0\n<P00> 500050 5000050 305 1 0\n<P01> 500075 5000075 306 1 25\n";
        let geometry = parse_geometry(text);
        let loop_seq: Vec<u32> = geometry.loops.iter().map(|l| l.sequence).collect();
        assert_eq!(loop_seq, vec![1, 0]);
        assert_eq!(geometry.loops[0].elevation, 310.5);
        assert_eq!(geometry.loops[0].units, CoordinateUnits::Metres);
        assert_eq!(geometry.stations.len(), 2);
        assert_eq!(geometry.stations[1].distance, 25.0);
        assert_eq!(geometry.stations[1].units, CoordinateUnits::Feet);
        assert!(geometry.malformed.is_empty());
    }

    #[test]
    fn malformed_elevation_drops_single_candidate() {
        let text = "<P00> 1 2 3 0 0\n<P01> 1 2 abc 0 25\n<P02> 1 2 3 0 50\n";
        let geometry = parse_geometry(text);
        let distances: Vec<f64> = geometry.stations.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![0.0, 50.0]);
        assert_eq!(geometry.malformed.len(), 1);
        assert_eq!(geometry.malformed[0].tag, "P01");
        assert!(geometry.malformed[0].reason.contains("elevation"));
    }

    #[test]
    fn non_finite_fields_are_malformed() {
        let text = "<P00> 1 2 3 0 NaN\n<P01> 1 inf 3 0 25\n<P02> 1 2 3 0 50\n<L00> nan 2 3 0\n";
        let geometry = parse_geometry(text);
        assert_eq!(geometry.stations.len(), 1);
        assert_eq!(geometry.stations[0].distance, 50.0);
        assert!(geometry.loops.is_empty());
        let tags: Vec<&str> = geometry.malformed.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, vec!["L00", "P00", "P01"]);
    }

    #[test]
    fn short_station_line_is_malformed() {
        let geometry = parse_geometry("<P03> 1 2 3 0\n");
        assert!(geometry.stations.is_empty());
        assert_eq!(geometry.malformed.len(), 1);
    }
}
