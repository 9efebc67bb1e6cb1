//! Property tests for filter composition and aggregation

mod common;

use std::collections::BTreeSet;

use arrow::array::AsArray;
use common::{dataset, AREA, VALUATION};
use proptest::prelude::*;
use zslice::percentile::quantile;
use zslice::records::SaleRecord;
use zslice::{aggregate, distribution, AggregationKind, FilterCriterion, FilterSet, FilterValue, GroupKey};

const COUNTIES: [&str; 3] = ["06037", "06059", "06111"];

fn arb_sale(parcel_id: i64) -> impl Strategy<Value = SaleRecord> {
    (
        0usize..COUNTIES.len(),
        prop::option::of(50_000.0..400_000.0f64),
        prop::option::of(500.0..4_000.0f64),
        1u8..7,
        1900i64..2017,
    )
        .prop_map(move |(county, valuation, area, bedrooms, year_built)| SaleRecord {
            parcel_id,
            fips: Some(COUNTIES[county].to_string()),
            bedrooms: Some(f64::from(bedrooms)),
            year_built: Some(year_built),
            valuation,
            area,
            ..Default::default()
        })
}

fn arb_sales(max_len: usize) -> impl Strategy<Value = Vec<SaleRecord>> {
    (0..=max_len).prop_flat_map(|len| (0..len as i64).map(arb_sale).collect::<Vec<_>>())
}

fn arb_bounds(lo: f64, hi: f64) -> impl Strategy<Value = (Option<f64>, Option<f64>)> {
    (prop::option::of(lo..hi), prop::option::of(lo..hi))
}

fn arb_criterion() -> impl Strategy<Value = FilterCriterion> {
    prop_oneof![
        arb_bounds(50_000.0, 400_000.0).prop_map(|(min, max)| FilterCriterion::Range {
            column: VALUATION.to_string(),
            min,
            max,
        }),
        arb_bounds(500.0, 4_000.0).prop_map(|(min, max)| FilterCriterion::Range {
            column: AREA.to_string(),
            min,
            max,
        }),
        prop::sample::subsequence(COUNTIES.to_vec(), 0..=COUNTIES.len()).prop_map(|codes| {
            FilterCriterion::SetMembership {
                column: "fips".to_string(),
                allowed: codes.into_iter().map(|c| FilterValue::Text(c.to_string())).collect(),
            }
        }),
        any::<bool>().prop_map(|active| FilterCriterion::PercentileToggle {
            metric: VALUATION.to_string(),
            active,
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_identity_filters_keep_every_row(sales in arb_sales(30)) {
        let base = dataset(&sales);
        let filters = FilterSet::new(vec![
            FilterCriterion::Range { column: VALUATION.to_string(), min: None, max: None },
            FilterCriterion::SetMembership { column: "fips".to_string(), allowed: vec![] },
            FilterCriterion::PercentileToggle { metric: AREA.to_string(), active: false },
            FilterCriterion::DateRange { column: "transactiondate".to_string(), start: None, end: None },
        ]);
        let view = filters.apply(&base).unwrap();
        prop_assert_eq!(view.num_rows(), base.num_rows());
    }

    #[test]
    fn prop_filter_order_does_not_matter(sales in arb_sales(30), a in arb_criterion(), b in arb_criterion()) {
        let base = dataset(&sales);
        let ab = FilterSet::new(vec![a.clone(), b.clone()]).apply(&base).unwrap();
        let ba = FilterSet::new(vec![b.clone(), a.clone()]).apply(&base).unwrap();
        prop_assert_eq!(ab.batch(), ba.batch());

        let a_then_b = FilterSet::new(vec![b.clone()])
            .refine(&base, &FilterSet::new(vec![a.clone()]).apply(&base).unwrap())
            .unwrap();
        let b_then_a = FilterSet::new(vec![a])
            .refine(&base, &FilterSet::new(vec![b]).apply(&base).unwrap())
            .unwrap();
        prop_assert_eq!(a_then_b.batch(), ab.batch());
        prop_assert_eq!(b_then_a.batch(), ab.batch());
    }

    #[test]
    fn prop_tightening_a_range_never_adds_rows(
        sales in arb_sales(30),
        (min, max) in (50_000.0..225_000.0f64, 225_000.0..400_000.0f64),
        (raise, lower) in (0.0..100_000.0f64, 0.0..100_000.0f64),
    ) {
        let base = dataset(&sales);
        let range = |min, max| FilterSet::new(vec![FilterCriterion::Range {
            column: VALUATION.to_string(),
            min: Some(min),
            max: Some(max),
        }]);
        let wide = range(min, max).apply(&base).unwrap();
        let narrow = range(min + raise, max - lower).apply(&base).unwrap();
        prop_assert!(narrow.num_rows() <= wide.num_rows());
    }

    #[test]
    fn prop_toggle_threshold_is_the_base_median(sales in arb_sales(30), other in arb_criterion()) {
        let base = dataset(&sales);
        let median = quantile(&base, VALUATION, 0.5).unwrap();
        let toggle = FilterCriterion::PercentileToggle { metric: VALUATION.to_string(), active: true };

        let view = FilterSet::new(vec![other.clone(), toggle.clone()]).apply(&base).unwrap();
        if let Some(median) = median {
            prop_assert!(view.numeric_values(VALUATION).unwrap().iter().all(|v| *v <= median));
        }

        let prefiltered = FilterSet::new(vec![other]).apply(&base).unwrap();
        let refined = FilterSet::new(vec![toggle]).refine(&base, &prefiltered).unwrap();
        prop_assert_eq!(refined.batch(), view.batch());
    }

    #[test]
    fn prop_group_keys_match_present_values(sales in arb_sales(30), filter in arb_criterion()) {
        let base = dataset(&sales);
        let view = FilterSet::new(vec![filter]).apply(&base).unwrap();

        let present: BTreeSet<String> = view
            .column("fips")
            .unwrap()
            .as_string::<i32>()
            .iter()
            .flatten()
            .map(str::to_string)
            .collect();

        let counts = distribution(&view, "fips").unwrap();
        let keys: BTreeSet<String> = counts.keys().map(GroupKey::to_string).collect();
        prop_assert_eq!(&keys, &present);
        prop_assert_eq!(counts.rows.iter().map(|r| r.value as usize).sum::<usize>(), view.num_rows());

        let sums = aggregate(&view, "fips", &[VALUATION, AREA], AggregationKind::Count).unwrap();
        for result in &sums {
            let keys: BTreeSet<String> = result.keys().map(GroupKey::to_string).collect();
            prop_assert_eq!(&keys, &present);
        }
    }
}
