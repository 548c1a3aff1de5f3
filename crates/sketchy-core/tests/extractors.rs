use sketchy_core::{ConfigError, DataPoint, DataPointExtractor};

const PLANT_CONFIG: &str = r#"{
    "keyConverter" : "NOOP",
    "valueConverter" : "CSVConverter",
    "valueConverterConfig" : {
        "columnMap" : {
            "sensor1_ts" : 0,
            "sensor1_value" : 1,
            "sensor2_ts" : 4,
            "sensor2_value" : 5,
            "plant_id" : 7
        }
    },
    "measurements" : [
        {
            "source" : "sensor_1",
            "timestampField" : "sensor1_ts",
            "measurementField" : "sensor1_value",
            "metadataFields" : [ "plant_id" ]
        },
        {
            "source" : "sensor_2",
            "timestampField" : "sensor2_ts",
            "measurementField" : "sensor2_value",
            "metadataFields" : [ "plant_id" ]
        }
    ]
}"#;

const FRAUD_CONFIG: &str = r#"{
    "valueConverter" : "CSVConverter",
    "valueConverterConfig" : {
        "columnMap" : {
            "physician_specialty" : 1,
            "transaction_date" : 2,
            "transaction_amount" : 3,
            "transaction_reason" : 4
        }
    },
    "measurements" : [
        {
            "sourceFields" : [ "physician_specialty", "transaction_reason" ],
            "timestampField" : "transaction_date",
            "timestampConverter" : "DateConverter",
            "timestampConverterConfig" : { "format" : "yyyy-MM-dd" },
            "measurementField" : "transaction_amount"
        }
    ]
}"#;

fn key() -> [u8; 8] {
    0i64.to_be_bytes()
}

#[test]
fn test_one_record_many_measurements() {
    let extractor = DataPointExtractor::from_json(PLANT_CONFIG).unwrap();
    assert_eq!(extractor.measurement_count(), 2);

    let points: Vec<DataPoint> = extractor
        .extract(&key(), b"0,100,foo,bar,50,7,grok,plant_1,baz")
        .collect();
    assert_eq!(points.len(), 2);

    let first = &points[0];
    assert_eq!(first.source(), "sensor_1");
    assert_eq!(first.timestamp(), 0);
    assert_eq!(first.value(), 100.0);
    assert_eq!(first.metadata().len(), 1);
    assert_eq!(first.metadata()["plant_id"], "plant_1");

    let last = &points[1];
    assert_eq!(last.source(), "sensor_2");
    assert_eq!(last.timestamp(), 50);
    assert_eq!(last.value(), 7.0);
    assert_eq!(last.metadata().len(), 1);
    assert_eq!(last.metadata()["plant_id"], "plant_1");
}

#[test]
fn test_comment_lines_yield_nothing() {
    let extractor = DataPointExtractor::from_json(PLANT_CONFIG).unwrap();
    assert_eq!(
        extractor
            .extract(&key(), b"   #0,100,foo,bar,50,7,grok,plant_1,baz")
            .count(),
        0
    );
}

#[test]
fn test_short_record_yields_nothing() {
    let extractor = DataPointExtractor::from_json(PLANT_CONFIG).unwrap();
    assert_eq!(extractor.extract(&key(), b"0,100,foo").count(), 0);
}

#[test]
fn test_source_from_fields_and_dates() {
    let extractor = DataPointExtractor::from_json(FRAUD_CONFIG).unwrap();
    let points: Vec<DataPoint> = extractor
        .extract(
            &key(),
            br#""id_1","optometrist","2016-02-16","75.00","Food""#,
        )
        .collect();
    assert_eq!(points.len(), 1);

    let point = &points[0];
    assert_eq!(point.source(), "optometrist.Food");
    assert_eq!(point.metadata().len(), 2);
    assert_eq!(point.metadata()["transaction_reason"], "Food");
    assert_eq!(point.metadata()["physician_specialty"], "optometrist");
    // 2016-02-16T00:00:00Z
    assert_eq!(point.timestamp(), 1_455_580_800_000);
    assert!((point.value() - 75.0).abs() < 1e-5);
}

#[test]
fn test_bad_documents_are_rejected() {
    assert!(matches!(
        DataPointExtractor::from_json("{ not json"),
        Err(ConfigError::Parse(_))
    ));

    let unknown_field = PLANT_CONFIG.replace("\"plant_id\" : 7", "\"plant\" : 7");
    assert!(matches!(
        DataPointExtractor::from_json(&unknown_field),
        Err(ConfigError::InvalidExtractor(_))
    ));

    let no_format = FRAUD_CONFIG.replace(r#""timestampConverterConfig" : { "format" : "yyyy-MM-dd" },"#, "");
    assert_ne!(no_format, FRAUD_CONFIG);
    assert!(DataPointExtractor::from_json(&no_format).is_err());
}
