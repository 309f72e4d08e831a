//! Integration tests for weigh report decoding and the scale catalog
//!
//! Run with: `cargo test -p protocol --test report_tests`

use protocol::{
    ReportError, STATUS_WEIGHT_STABLE, ScaleCatalog, ScaleIdentity, WEIGH_REPORT_SIZE,
    WeighReport, WeightMeasurement, decode_weight,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

fn report(report_id: u8, status: u8, exponent: i8, raw: u16) -> [u8; WEIGH_REPORT_SIZE] {
    let [lo, hi] = raw.to_le_bytes();
    [report_id, status, 0x00, exponent as u8, lo, hi]
}

mod decoding {
    use super::*;

    #[test]
    fn test_one_kilogram() {
        let weight = decode_weight(&[0x04, 0x04, 0x00, 0xFE, 0x64, 0x00]).unwrap();
        assert_eq!(weight.value(), 1.0);
    }

    #[test]
    fn test_high_byte_is_second() {
        let weight = decode_weight(&report(0x03, 0x04, 0, 0x0100)).unwrap();
        assert_eq!(weight.value(), 256.0);
    }

    #[test]
    fn test_zero_weight_is_published() {
        let weight = decode_weight(&report(0x03, 0x04, -1, 0)).unwrap();
        assert_eq!(weight.value(), 0.0);
    }

    #[test]
    fn test_unused_byte_is_ignored() {
        let mut bytes = report(0x03, 0x04, -1, 25);
        bytes[2] = 0xEE;
        assert_eq!(decode_weight(&bytes).unwrap().value(), 2.5);
    }

    #[test]
    fn test_non_stable_statuses() {
        for status in [0x01, 0x02, 0x03, 0x05, 0x06, 0x07, 0x08] {
            assert_eq!(
                decode_weight(&report(0x03, status, 0, 10)),
                Err(ReportError::NotWeighing(status)),
                "status {:#04x}",
                status
            );
        }
    }

    #[test]
    fn test_oversized_report_rejected() {
        let bytes = [0x03, 0x04, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_weight(&bytes),
            Err(ReportError::Length { actual: 8, .. })
        ));
    }

    #[test]
    fn test_empty_report_rejected() {
        assert!(matches!(
            WeighReport::parse(&[]),
            Err(ReportError::Length { actual: 0, .. })
        ));
    }
}

mod properties {
    use super::*;

    /// Correctly rounded 10^exponent, straight from the decimal literal
    fn power_of_ten(exponent: i8) -> f64 {
        format!("1e{}", exponent).parse().unwrap()
    }

    #[test]
    fn test_every_exponent_is_an_exact_power_of_ten() {
        for exponent in i8::MIN..=i8::MAX {
            let weight =
                decode_weight(&report(0x03, STATUS_WEIGHT_STABLE, exponent, 1)).unwrap();
            assert_eq!(weight.value(), power_of_ten(exponent), "exponent {}", exponent);
        }
    }

    proptest! {
        #[test]
        fn decode_matches_formula(
            report_id in prop::sample::select(vec![0x03u8, 0x04u8]),
            exponent in any::<i8>(),
            raw in any::<u16>(),
        ) {
            let weight = decode_weight(&report(report_id, STATUS_WEIGHT_STABLE, exponent, raw))
                .unwrap();
            let expected = f64::from(raw) * power_of_ten(exponent);
            prop_assert_eq!(weight.value(), expected);
        }

        #[test]
        fn decode_is_deterministic(bytes in prop::array::uniform6(any::<u8>())) {
            prop_assert_eq!(decode_weight(&bytes), decode_weight(&bytes));
        }

        #[test]
        fn invalid_status_never_decodes(
            report_id in any::<u8>(),
            status in any::<u8>().prop_filter("non-stable", |s| *s != STATUS_WEIGHT_STABLE),
            exponent in any::<i8>(),
            raw in any::<u16>(),
        ) {
            prop_assert!(decode_weight(&report(report_id, status, exponent, raw)).is_err());
        }

        #[test]
        fn invalid_report_id_never_decodes(
            report_id in any::<u8>().prop_filter("non-weigh id", |id| *id != 0x03 && *id != 0x04),
            exponent in any::<i8>(),
            raw in any::<u16>(),
        ) {
            prop_assert_eq!(
                decode_weight(&report(report_id, STATUS_WEIGHT_STABLE, exponent, raw)),
                Err(ReportError::UnexpectedReportId(report_id))
            );
        }

        #[test]
        fn wrong_length_never_decodes(
            bytes in proptest::collection::vec(any::<u8>(), 0..64)
                .prop_filter("not six bytes", |b| b.len() != WEIGH_REPORT_SIZE),
        ) {
            let is_length_error = matches!(decode_weight(&bytes), Err(ReportError::Length { .. }));
            prop_assert!(is_length_error);
        }
    }

    #[test]
    fn test_extreme_exponents_are_finite() {
        let tiny = WeightMeasurement::from_raw(1, i8::MIN);
        let huge = WeightMeasurement::from_raw(u16::MAX, i8::MAX);
        assert!(tiny.value() > 0.0);
        assert!(huge.value().is_finite());
    }
}

mod catalog {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Settings {
        catalog: ScaleCatalog,
    }

    #[test]
    fn test_catalog_from_toml() {
        let settings: Settings =
            toml::from_str(r#"catalog = ["0x0922:0x8003", "0x1446:0x6a73"]"#).unwrap();

        assert_eq!(settings.catalog.len(), 2);
        assert!(settings.catalog.contains(0x0922, 0x8003));
        assert!(settings.catalog.contains(0x1446, 0x6a73));
    }

    #[test]
    fn test_catalog_rejects_bad_entry() {
        let result: Result<Settings, _> = toml::from_str(r#"catalog = ["0922:8003"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_serializes_as_strings() {
        let settings = Settings {
            catalog: ScaleCatalog::new(vec![ScaleIdentity::new(0x0922, 0x8003)]),
        };
        let text = toml::to_string(&settings).unwrap();
        assert!(text.contains("\"0x0922:0x8003\""));
    }

    #[test]
    fn test_synthetic_catalog_is_independent_of_default() {
        let catalog = ScaleCatalog::new(vec![ScaleIdentity::new(0xdead, 0xbeef)]);
        assert!(catalog.contains(0xdead, 0xbeef));
        assert!(!catalog.contains(0x0922, 0x8003));
    }
}
