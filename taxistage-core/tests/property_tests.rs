//! Property tests for key validation and naming.

use proptest::prelude::*;
use taxistage_core::{DatasetKey, KeyError, SourceEndpoint, StagingDir, TripCategory};

fn arb_category() -> impl Strategy<Value = TripCategory> {
    prop::sample::select(TripCategory::ALL.to_vec())
}

proptest! {
    /// File name, URL and cache path all end in the same canonical segment.
    #[test]
    fn naming_is_consistent(year in 2009i32..=2100, month in 1u32..=12, cat in arb_category()) {
        let key = DatasetKey::new(year, month, cat).unwrap();
        let name = key.file_name();
        prop_assert_eq!(&name, &format!("{}_tripdata_{}-{:02}.parquet", cat, year, month));

        let url = SourceEndpoint::default().location(&key);
        let suffix = format!("/{name}");
        prop_assert!(url.as_str().ends_with(&suffix));

        let entry = StagingDir::new("staging").entry(&key);
        prop_assert_eq!(entry.path().file_name().unwrap().to_str().unwrap(), name.as_str());

        prop_assert_eq!(DatasetKey::from_file_name(&name), Some(key));
    }

    /// Months outside 1..=12 never make a key.
    #[test]
    fn bad_months_rejected(year in 2009i32..=2100, month in 13u32.., cat in arb_category()) {
        prop_assert_eq!(
            DatasetKey::new(year, month, cat),
            Err(KeyError::MonthOutOfRange(month))
        );
    }

    /// String and integer constructors agree.
    #[test]
    fn parse_matches_new(year in 2009i32..=2100, month in 1u32..=12, cat in arb_category()) {
        let from_str = DatasetKey::parse(&year.to_string(), &format!("{month:02}"), &cat.to_string().to_uppercase());
        prop_assert_eq!(from_str, DatasetKey::new(year, month, cat));
    }
}
