//! Integration tests for the Meridian pipeline
//!
//! These tests run against the public API: frames from the bundled test data
//! are assembled, indexed and searched end to end.

use meridian::data_processing::test_data::{self, *};
use meridian::{
    AddressType, Geocoder, PipelineConfigBuilder, QueryState, SearchRequest, TagFilter,
    TagFilterQueryBuilder, to_feature_collection,
};

fn setup_test_env() {
    let _ = meridian::init_logging(tracing::Level::WARN);
}

fn indexed_geocoder() -> Geocoder {
    let geocoder = Geocoder::with_defaults().expect("Should create geocoder");
    let report = geocoder
        .index_frames(
            &test_data::place_frame().expect("place frame"),
            &test_data::address_frame().expect("address frame"),
        )
        .expect("Indexing should work");
    assert!(report.failures.is_empty(), "No place should fail: {:?}", report.failures);
    assert_eq!(report.rejected_rows, 0);
    geocoder
}

#[test]
fn test_full_workflow() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    // 1. Plain search
    let results = geocoder
        .search(&SearchRequest::new("Marienplatz").with_language("de"))
        .expect("Search should work");
    let street = results
        .iter()
        .find(|r| r.place_id == MARIENPLATZ_PLACE_ID)
        .expect("Should find Marienplatz");
    assert_eq!(street.city.as_deref(), Some("München"));
    assert_eq!(street.state.as_deref(), Some("Bayern"));
    assert_eq!(street.country.as_deref(), Some("Deutschland"));
    assert_eq!(street.postcode.as_deref(), Some("80331"));
    assert_eq!(street.country_code.as_deref(), Some("DE"));

    // 2. Same place, other language
    let results = geocoder
        .search(&SearchRequest::new("Marienplatz").with_language("en"))
        .expect("Search should work");
    let street = results
        .iter()
        .find(|r| r.place_id == MARIENPLATZ_PLACE_ID)
        .expect("Should find Marienplatz");
    assert_eq!(street.city.as_deref(), Some("Munich"));
    assert_eq!(street.country.as_deref(), Some("Germany"));

    // 3. Limit
    let limited = geocoder
        .search(&SearchRequest::new("München").with_limit(1))
        .expect("Limited search should work");
    assert!(limited.len() <= 1, "Should respect limit");
}

#[test]
fn test_curated_city() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let results = geocoder
        .search(&SearchRequest::new("Alexanderplatz").with_language("de"))
        .expect("Search should work");
    let square = &results[0];
    assert_eq!(square.place_id, ALEXANDERPLATZ_PLACE_ID);
    assert_eq!(square.city.as_deref(), Some("Berlin"), "Berlin is a curated city");
    assert_eq!(square.state.as_deref(), Some("Berlin"), "and a state as well");
    assert_eq!(square.country.as_deref(), Some("Deutschland"));
}

#[test]
fn test_metropolitan_override() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let results = geocoder
        .search(&SearchRequest::new("Baker Street").with_language("fr"))
        .expect("Search should work");
    let street = &results[0];
    assert_eq!(street.place_id, BAKER_STREET_PLACE_ID);
    assert_eq!(street.city.as_deref(), Some("Londres"));
    assert_eq!(street.state.as_deref(), Some("England"));

    let doc = &geocoder.index().get(BAKER_STREET_PLACE_ID).expect("stored document")[0];
    let context = doc.context.all_names();
    assert!(context.contains("City of Westminster"), "Replaced city moves to context");
    assert!(context.contains("Greater London"));

    // Boroughs are still searchable through the context
    let results = geocoder
        .search(&SearchRequest::new("Baker Street Westminster"))
        .expect("Search should work");
    assert_eq!(results[0].place_id, BAKER_STREET_PLACE_ID);
}

#[test]
fn test_tag_filters() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let all = geocoder
        .search(&SearchRequest::new("München"))
        .expect("Search should work");
    assert!(all.iter().any(|r| r.osm_key == "place"));
    assert!(all.iter().any(|r| r.osm_key == "highway"));

    let streets = geocoder
        .search(&SearchRequest::new("München").with_tag("highway"))
        .expect("Filtered search should work");
    assert!(!streets.is_empty());
    assert!(streets.iter().all(|r| r.osm_key == "highway"));

    let no_streets = geocoder
        .search(&SearchRequest::new("München").with_tag("!highway").with_tag(":!townhall"))
        .expect("Filtered search should work");
    assert!(!no_streets.is_empty());
    assert!(no_streets.iter().all(|r| r.osm_key != "highway" && r.osm_value != "townhall"));

    // Invalid tokens are skipped rather than failing the request
    let lenient = geocoder
        .search(&SearchRequest::new("München").with_tag("a:b:c").with_tag(":"))
        .expect("Invalid tokens should be ignored");
    assert_eq!(lenient.len(), all.len());
}

#[test]
fn test_house_number_documents() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let results = geocoder
        .search(&SearchRequest::new("Neues Rathaus").with_language("en"))
        .expect("Search should work");
    let mut numbers: Vec<_> = results
        .iter()
        .filter(|r| r.place_id == RATHAUS_PLACE_ID)
        .filter_map(|r| r.housenumber.as_deref())
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec!["10", "8"]);
    assert!(results.iter().all(|r| r.name.as_deref() == Some("New Town Hall")));
    assert!(results.iter().all(|r| r.street.as_deref() == Some("Marienplatz")));
}

#[test]
fn test_layer_filters() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let results = geocoder
        .search(&SearchRequest::new("Marienplatz").with_layer("street"))
        .expect("Search should work");
    assert!(results.iter().any(|r| r.place_id == MARIENPLATZ_PLACE_ID));
    assert!(
        results.iter().all(|r| r.address_type == AddressType::Street),
        "The town hall is a house and is filtered out"
    );

    let results = geocoder
        .search(&SearchRequest::new("Marienplatz").with_layer("house"))
        .expect("Search should work");
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.place_id == RATHAUS_PLACE_ID));

    assert!(
        geocoder
            .search(&SearchRequest::new("Marienplatz").with_layer("continent"))
            .is_err(),
        "Unknown layers are rejected"
    );
}

#[test]
fn test_geojson_output() {
    setup_test_env();
    let geocoder = indexed_geocoder();

    let request = SearchRequest::new("Marienplatz");
    let results = geocoder.search(&request).expect("Search should work");
    let collection = geocoder.search_geojson(&request).expect("GeoJSON should render");

    assert_eq!(collection, to_feature_collection(&results));
    let features = collection["features"].as_array().expect("features array");
    assert_eq!(features.len(), results.len());
    assert!(features.iter().all(|f| f["geometry"]["type"] == "Point"));
}

#[test]
fn test_parquet_ingestion() {
    setup_test_env();
    let mut places = test_data::place_frame().expect("place frame");
    let mut addresses = test_data::address_frame().expect("address frame");
    let place_file = test_data::write_parquet(&mut places).expect("write places");
    let address_file = test_data::write_parquet(&mut addresses).expect("write addresses");

    let geocoder = Geocoder::with_defaults().expect("Should create geocoder");
    let report = geocoder
        .index_parquet(place_file.path(), address_file.path())
        .expect("Parquet indexing should work");
    assert!(report.indexed > 0);

    let missing = geocoder.index_parquet("/nonexistent/places.parquet", address_file.path());
    assert!(missing.is_err(), "Missing files should be reported");
}

#[test]
fn test_custom_configuration() {
    setup_test_env();

    // Without the London override, Westminster stays the city
    let config = PipelineConfigBuilder::minimal()
        .languages(["en"])
        .build()
        .expect("Config should build");
    let geocoder = Geocoder::new(config).expect("Should create geocoder");
    geocoder
        .index_frames(
            &test_data::place_frame().expect("place frame"),
            &test_data::address_frame().expect("address frame"),
        )
        .expect("Indexing should work");

    let doc = &geocoder.index().get(BAKER_STREET_PLACE_ID).expect("stored document")[0];
    assert_eq!(
        doc.address_part(AddressType::City).and_then(|n| n.default_name()),
        Some("City of Westminster")
    );
}

#[test]
fn test_query_builder_public_api() {
    setup_test_env();
    let languages = vec!["en".to_string()];

    let builder = TagFilterQueryBuilder::new("cafe", "en", &languages);
    assert_eq!(builder.state(), QueryState::Plain);

    let builder = builder.with_tag_filters(&TagFilter::parse_all(["amenity:cafe", "!shop"]));
    assert_eq!(builder.state(), QueryState::Filtered);

    let query = builder.with_limit(Some(0)).build().expect("Query should build");
    assert_eq!(query.state(), QueryState::Finished);
    assert_eq!(query.spec().limit, 15);
    assert!(query.spec().accepts_tag("amenity", "cafe"));
    assert!(!query.spec().accepts_tag("shop", "cafe"));

    let json = serde_json::to_value(query.spec()).expect("spec serializes");
    assert_eq!(json["query"], "cafe");
}

#[test]
fn test_concurrent_access() {
    setup_test_env();
    let geocoder = std::sync::Arc::new(indexed_geocoder());

    let handles: Vec<_> = ["München", "Berlin", "London"]
        .into_iter()
        .map(|term| {
            let geocoder = std::sync::Arc::clone(&geocoder);
            std::thread::spawn(move || geocoder.search(&SearchRequest::new(term)).map(|r| r.len()))
        })
        .collect();

    for handle in handles {
        let found = handle.join().expect("thread should not panic").expect("search should work");
        assert!(found > 0);
    }
}
