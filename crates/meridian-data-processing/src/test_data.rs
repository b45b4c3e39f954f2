use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::info;

use super::error::Result;

pub const GERMANY_PLACE_ID: u64 = 100;
pub const BAVARIA_PLACE_ID: u64 = 101;
pub const BERLIN_PLACE_ID: u64 = 102;
pub const POSTCODE_80331_PLACE_ID: u64 = 104;
pub const MUNICH_PLACE_ID: u64 = 1001;
pub const MARIENPLATZ_PLACE_ID: u64 = 1002;
pub const RATHAUS_PLACE_ID: u64 = 1003;
pub const ALEXANDERPLATZ_PLACE_ID: u64 = 2001;
pub const UK_PLACE_ID: u64 = 200;
pub const ENGLAND_PLACE_ID: u64 = 201;
pub const GREATER_LONDON_PLACE_ID: u64 = 202;
pub const WESTMINSTER_PLACE_ID: u64 = 203;
pub const BAKER_STREET_PLACE_ID: u64 = 3001;

/// OSM relation id of Berlin, a curated city.
pub const BERLIN_RELATION_ID: u64 = 62422;
/// OSM relation id of Greater London, the default metropolitan override.
pub const GREATER_LONDON_RELATION_ID: u64 = 175342;

struct PlaceFixture {
    place_id: u64,
    osm: (&'static str, u64),
    tag: (&'static str, &'static str),
    names: &'static str,
    extratags: Option<&'static str>,
    housenumber: Option<&'static str>,
    postcode: Option<&'static str>,
    country_code: &'static str,
    centroid: (f64, f64),
    bbox: Option<[f64; 4]>,
    rank_address: u8,
    rank_search: u8,
    admin_level: Option<u8>,
    importance: Option<f64>,
}

struct AddressFixture {
    for_place_id: u64,
    place_id: u64,
    osm: Option<(&'static str, u64)>,
    tag: (&'static str, &'static str),
    names: &'static str,
    rank_address: u8,
    admin_level: Option<u8>,
    place: Option<&'static str>,
    postcode: Option<&'static str>,
    is_address: bool,
    country_code: Option<&'static str>,
}

const PLACES: &[PlaceFixture] = &[
    PlaceFixture {
        place_id: MUNICH_PLACE_ID,
        osm: ("N", 240109189),
        tag: ("place", "city"),
        names: r#"{"name": "München", "name:en": "Munich", "name:it": "Monaco di Baviera"}"#,
        extratags: Some(r#"{"place": "city", "population": "1512491"}"#),
        housenumber: None,
        postcode: None,
        country_code: "de",
        centroid: (11.5755, 48.1372),
        bbox: Some([11.3608, 48.0616, 11.7229, 48.2482]),
        rank_address: 16,
        rank_search: 16,
        admin_level: None,
        importance: Some(0.83),
    },
    PlaceFixture {
        place_id: MARIENPLATZ_PLACE_ID,
        osm: ("W", 4066710),
        tag: ("highway", "pedestrian"),
        names: r#"{"name": "Marienplatz"}"#,
        extratags: None,
        housenumber: None,
        postcode: Some("80331"),
        country_code: "de",
        centroid: (11.5754, 48.1373),
        bbox: None,
        rank_address: 26,
        rank_search: 26,
        admin_level: None,
        importance: None,
    },
    PlaceFixture {
        place_id: RATHAUS_PLACE_ID,
        osm: ("W", 24993304),
        tag: ("building", "townhall"),
        names: r#"{"name": "Neues Rathaus", "name:en": "New Town Hall"}"#,
        extratags: None,
        housenumber: Some("8;10"),
        postcode: None,
        country_code: "de",
        centroid: (11.5761, 48.1376),
        bbox: None,
        rank_address: 30,
        rank_search: 30,
        admin_level: None,
        importance: Some(0.41),
    },
    PlaceFixture {
        place_id: ALEXANDERPLATZ_PLACE_ID,
        osm: ("W", 4060237),
        tag: ("highway", "pedestrian"),
        names: r#"{"name": "Alexanderplatz"}"#,
        extratags: None,
        housenumber: None,
        postcode: Some("10178"),
        country_code: "de",
        centroid: (13.4132, 52.5219),
        bbox: None,
        rank_address: 26,
        rank_search: 26,
        admin_level: None,
        importance: None,
    },
    PlaceFixture {
        place_id: BAKER_STREET_PLACE_ID,
        osm: ("W", 4256036),
        tag: ("highway", "primary"),
        names: r#"{"name": "Baker Street"}"#,
        extratags: None,
        housenumber: None,
        postcode: Some("NW1 6XE"),
        country_code: "gb",
        centroid: (-0.1571, 51.5226),
        bbox: None,
        rank_address: 26,
        rank_search: 26,
        admin_level: None,
        importance: None,
    },
];

const fn line(
    for_place_id: u64,
    place_id: u64,
    tag: (&'static str, &'static str),
    names: &'static str,
    rank_address: u8,
) -> AddressFixture {
    AddressFixture {
        for_place_id,
        place_id,
        osm: None,
        tag,
        names,
        rank_address,
        admin_level: None,
        place: None,
        postcode: None,
        is_address: true,
        country_code: None,
    }
}

const GERMANY_NAMES: &str = r#"{"name": "Deutschland", "name:en": "Germany", "name:it": "Germania"}"#;
const BAVARIA_NAMES: &str = r#"{"name": "Bayern", "name:en": "Bavaria", "name:it": "Baviera"}"#;
const MUNICH_NAMES: &str = r#"{"name": "München", "name:en": "Munich", "name:it": "Monaco di Baviera"}"#;

fn germany(for_place_id: u64) -> AddressFixture {
    AddressFixture {
        osm: Some(("R", 51477)),
        admin_level: Some(2),
        country_code: Some("de"),
        ..line(for_place_id, GERMANY_PLACE_ID, ("boundary", "administrative"), GERMANY_NAMES, 4)
    }
}

fn bavaria(for_place_id: u64) -> AddressFixture {
    AddressFixture {
        osm: Some(("R", 2145268)),
        admin_level: Some(4),
        place: Some("state"),
        ..line(for_place_id, BAVARIA_PLACE_ID, ("boundary", "administrative"), BAVARIA_NAMES, 8)
    }
}

fn munich(for_place_id: u64) -> AddressFixture {
    AddressFixture {
        osm: Some(("N", 240109189)),
        ..line(for_place_id, MUNICH_PLACE_ID, ("place", "city"), MUNICH_NAMES, 16)
    }
}

fn address_fixtures() -> Vec<AddressFixture> {
    vec![
        // München
        bavaria(MUNICH_PLACE_ID),
        germany(MUNICH_PLACE_ID),
        // Marienplatz
        AddressFixture {
            postcode: Some("80331"),
            ..line(
                MARIENPLATZ_PLACE_ID,
                POSTCODE_80331_PLACE_ID,
                ("place", "postcode"),
                r#"{"ref": "80331"}"#,
                21,
            )
        },
        munich(MARIENPLATZ_PLACE_ID),
        bavaria(MARIENPLATZ_PLACE_ID),
        germany(MARIENPLATZ_PLACE_ID),
        // Neues Rathaus
        line(
            RATHAUS_PLACE_ID,
            MARIENPLATZ_PLACE_ID,
            ("highway", "pedestrian"),
            r#"{"name": "Marienplatz"}"#,
            26,
        ),
        AddressFixture {
            postcode: Some("80331"),
            ..line(
                RATHAUS_PLACE_ID,
                POSTCODE_80331_PLACE_ID,
                ("place", "postcode"),
                r#"{"ref": "80331"}"#,
                21,
            )
        },
        munich(RATHAUS_PLACE_ID),
        bavaria(RATHAUS_PLACE_ID),
        germany(RATHAUS_PLACE_ID),
        // Alexanderplatz, inside curated Berlin
        AddressFixture {
            osm: Some(("R", BERLIN_RELATION_ID)),
            admin_level: Some(4),
            place: Some("city"),
            ..line(
                ALEXANDERPLATZ_PLACE_ID,
                BERLIN_PLACE_ID,
                ("boundary", "administrative"),
                r#"{"name": "Berlin", "name:en": "Berlin"}"#,
                8,
            )
        },
        germany(ALEXANDERPLATZ_PLACE_ID),
        // Baker Street, inside Greater London
        AddressFixture {
            osm: Some(("R", 51781)),
            admin_level: Some(8),
            ..line(
                BAKER_STREET_PLACE_ID,
                WESTMINSTER_PLACE_ID,
                ("boundary", "administrative"),
                r#"{"name": "City of Westminster"}"#,
                16,
            )
        },
        AddressFixture {
            osm: Some(("R", GREATER_LONDON_RELATION_ID)),
            admin_level: Some(5),
            ..line(
                BAKER_STREET_PLACE_ID,
                GREATER_LONDON_PLACE_ID,
                ("boundary", "administrative"),
                r#"{"name": "Greater London"}"#,
                12,
            )
        },
        AddressFixture {
            osm: Some(("R", 58447)),
            admin_level: Some(4),
            ..line(
                BAKER_STREET_PLACE_ID,
                ENGLAND_PLACE_ID,
                ("boundary", "administrative"),
                r#"{"name": "England"}"#,
                8,
            )
        },
        AddressFixture {
            osm: Some(("R", 62149)),
            admin_level: Some(2),
            country_code: Some("gb"),
            ..line(
                BAKER_STREET_PLACE_ID,
                UK_PLACE_ID,
                ("boundary", "administrative"),
                r#"{"name": "United Kingdom", "name:de": "Vereinigtes Königreich"}"#,
                4,
            )
        },
    ]
}

/// Place frame with a city, a street, a house with two numbers, a street in
/// a curated city and a street inside a metropolitan override.
pub fn place_frame() -> Result<DataFrame> {
    let bbox = |i: usize| -> Vec<Option<f64>> {
        PLACES.iter().map(|p| p.bbox.map(|b| b[i])).collect()
    };
    let df = DataFrame::new(vec![
        Column::new("place_id".into(), PLACES.iter().map(|p| p.place_id).collect::<Vec<_>>()),
        Column::new("osm_type".into(), PLACES.iter().map(|p| p.osm.0).collect::<Vec<_>>()),
        Column::new("osm_id".into(), PLACES.iter().map(|p| p.osm.1).collect::<Vec<_>>()),
        Column::new("class".into(), PLACES.iter().map(|p| p.tag.0).collect::<Vec<_>>()),
        Column::new("type".into(), PLACES.iter().map(|p| p.tag.1).collect::<Vec<_>>()),
        Column::new("name".into(), PLACES.iter().map(|p| p.names).collect::<Vec<_>>()),
        Column::new("extratags".into(), PLACES.iter().map(|p| p.extratags).collect::<Vec<_>>()),
        Column::new("housenumber".into(), PLACES.iter().map(|p| p.housenumber).collect::<Vec<_>>()),
        Column::new("postcode".into(), PLACES.iter().map(|p| p.postcode).collect::<Vec<_>>()),
        Column::new("country_code".into(), PLACES.iter().map(|p| p.country_code).collect::<Vec<_>>()),
        Column::new("lon".into(), PLACES.iter().map(|p| p.centroid.0).collect::<Vec<_>>()),
        Column::new("lat".into(), PLACES.iter().map(|p| p.centroid.1).collect::<Vec<_>>()),
        Column::new("bbox_min_lon".into(), bbox(0)),
        Column::new("bbox_min_lat".into(), bbox(1)),
        Column::new("bbox_max_lon".into(), bbox(2)),
        Column::new("bbox_max_lat".into(), bbox(3)),
        Column::new(
            "rank_address".into(),
            PLACES.iter().map(|p| u32::from(p.rank_address)).collect::<Vec<_>>(),
        ),
        Column::new(
            "rank_search".into(),
            PLACES.iter().map(|p| u32::from(p.rank_search)).collect::<Vec<_>>(),
        ),
        Column::new(
            "admin_level".into(),
            PLACES.iter().map(|p| p.admin_level.map(u32::from)).collect::<Vec<_>>(),
        ),
        Column::new("importance".into(), PLACES.iter().map(|p| p.importance).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

/// Address lines for every place in [`place_frame`], nearest ancestor first.
pub fn address_frame() -> Result<DataFrame> {
    let lines = address_fixtures();
    let df = DataFrame::new(vec![
        Column::new("for_place_id".into(), lines.iter().map(|l| l.for_place_id).collect::<Vec<_>>()),
        Column::new("place_id".into(), lines.iter().map(|l| l.place_id).collect::<Vec<_>>()),
        Column::new("osm_type".into(), lines.iter().map(|l| l.osm.map(|o| o.0)).collect::<Vec<_>>()),
        Column::new("osm_id".into(), lines.iter().map(|l| l.osm.map(|o| o.1)).collect::<Vec<_>>()),
        Column::new("class".into(), lines.iter().map(|l| l.tag.0).collect::<Vec<_>>()),
        Column::new("type".into(), lines.iter().map(|l| l.tag.1).collect::<Vec<_>>()),
        Column::new("name".into(), lines.iter().map(|l| l.names).collect::<Vec<_>>()),
        Column::new(
            "rank_address".into(),
            lines.iter().map(|l| u32::from(l.rank_address)).collect::<Vec<_>>(),
        ),
        Column::new(
            "admin_level".into(),
            lines.iter().map(|l| l.admin_level.map(u32::from)).collect::<Vec<_>>(),
        ),
        Column::new("place".into(), lines.iter().map(|l| l.place).collect::<Vec<_>>()),
        Column::new("postcode".into(), lines.iter().map(|l| l.postcode).collect::<Vec<_>>()),
        Column::new("isaddress".into(), lines.iter().map(|l| l.is_address).collect::<Vec<_>>()),
        Column::new("country_code".into(), lines.iter().map(|l| l.country_code).collect::<Vec<_>>()),
    ])?;
    Ok(df)
}

/// Writes a frame to a temporary parquet file that lives as long as the
/// returned handle.
pub fn write_parquet(df: &mut DataFrame) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".parquet").tempfile()?;
    ParquetWriter::new(file.as_file_mut()).finish(df)?;
    info!(path = ?file.path(), rows = df.height(), "Wrote parquet fixture");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_frames_have_expected_shape() {
        let places = place_frame().unwrap();
        assert_eq!(places.height(), PLACES.len());
        assert_eq!(places.width(), 20);

        let addresses = address_frame().unwrap();
        assert_eq!(addresses.height(), address_fixtures().len());
        assert_eq!(
            addresses.column("isaddress").unwrap().dtype(),
            &DataType::Boolean
        );
    }

    #[test]
    fn test_every_address_line_points_at_a_fixture_place() {
        let lines = address_fixtures();
        for fixture in &lines {
            assert!(
                PLACES.iter().any(|p| p.place_id == fixture.for_place_id),
                "address line for unknown place {}",
                fixture.for_place_id
            );
        }
    }
}
