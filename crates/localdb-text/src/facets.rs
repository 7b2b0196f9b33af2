//! Facet aggregation: flat label counts and fixed numeric ranges.

use std::collections::BTreeSet;

use tantivy::collector::{Collector, FacetCollector, FacetCounts, SegmentCollector};
use tantivy::columnar::Column;
use tantivy::schema::Facet as FacetPath;
use tantivy::{DocId, Score, SegmentOrdinal, SegmentReader};

use localdb_core::config::{DimensionSettings, FacetSettings};
use localdb_core::types::{Facet, FacetDimension};

use crate::drilldown::{drilldown_link, Constraint, RangeBound};
use crate::tantivy_utils::FIELD_FACETS;

/// Buckets of the range dimension: label, inclusive lower, exclusive upper.
pub const RANGE_BUCKETS: [(&str, Option<i64>, Option<i64>); 5] = [
    ("Ultra wide (<24mm)", None, Some(24)),
    ("Wide (24-35)", Some(24), Some(35)),
    ("Normal (35-70)", Some(35), Some(70)),
    ("Medium tele (70-135)", Some(70), Some(135)),
    ("Telephoto (>=135)", Some(135), None),
];

/// Collector counting the children of every configured flat dimension.
pub fn facet_collector(settings: &FacetSettings) -> FacetCollector {
    let mut collector = FacetCollector::for_field(FIELD_FACETS);
    let mut seen = BTreeSet::new();
    for dim in &settings.dimensions {
        if seen.insert(dim.dimension.as_str()) {
            collector.add_facet(FacetPath::from_path([dim.dimension.as_str()]));
        }
    }
    collector
}

/// One entry per configured dimension that has at least one label, in
/// configuration order.
pub fn flat_dimensions(
    counts: &FacetCounts,
    settings: &FacetSettings,
    max_labels: usize,
    base_path: &str,
) -> Vec<FacetDimension> {
    settings
        .dimensions
        .iter()
        .filter_map(|dim| {
            let facets = dimension_labels(counts, dim, max_labels, base_path);
            (!facets.is_empty()).then(|| FacetDimension { name: dim.display_name.clone(), facets })
        })
        .collect()
}

fn dimension_labels(counts: &FacetCounts, dim: &DimensionSettings, max_labels: usize, base_path: &str) -> Vec<Facet> {
    let mut labels: Vec<(String, u64)> = counts
        .get(FacetPath::from_path([dim.dimension.as_str()]))
        .filter_map(|(facet, count)| {
            let label = facet.to_path().last().map(|s| s.to_string())?;
            (!label.is_empty() && count > 0).then_some((label, count))
        })
        .collect();
    labels.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    labels.truncate(max_labels);
    labels
        .into_iter()
        .map(|(label, count)| {
            let link = drilldown_link(base_path, &dim.dimension, &Constraint::Exact(label.clone()));
            Facet { label, count, link }
        })
        .collect()
}

/// Hits per entry of [`RANGE_BUCKETS`], in bucket order.
pub type RangeCounts = [u64; RANGE_BUCKETS.len()];

/// Buckets the range dimension's fast-field value of every hit. Runs in the
/// same pass as the other collectors. With no field every count stays 0.
pub struct RangeBucketCollector {
    field: Option<String>,
}

impl RangeBucketCollector {
    pub fn new(field: Option<String>) -> Self {
        Self { field }
    }
}

pub struct RangeBucketSegmentCollector {
    column: Option<Column<i64>>,
    counts: RangeCounts,
}

impl Collector for RangeBucketCollector {
    type Fruit = RangeCounts;
    type Child = RangeBucketSegmentCollector;

    fn for_segment(&self, _segment_ord: SegmentOrdinal, segment: &SegmentReader) -> tantivy::Result<Self::Child> {
        let column = match &self.field {
            Some(field) => Some(segment.fast_fields().i64(field)?),
            None => None,
        };
        Ok(RangeBucketSegmentCollector { column, counts: [0; RANGE_BUCKETS.len()] })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_counts: Vec<RangeCounts>) -> tantivy::Result<RangeCounts> {
        let mut total = [0; RANGE_BUCKETS.len()];
        for counts in segment_counts {
            for (sum, count) in total.iter_mut().zip(counts) {
                *sum += count;
            }
        }
        Ok(total)
    }
}

impl SegmentCollector for RangeBucketSegmentCollector {
    type Fruit = RangeCounts;

    fn collect(&mut self, doc: DocId, _score: Score) {
        let Some(value) = self.column.as_ref().and_then(|c| c.first(doc)) else {
            return;
        };
        if let Some(bucket) = bucket_of(value) {
            self.counts[bucket] += 1;
        }
    }

    fn harvest(self) -> RangeCounts {
        self.counts
    }
}

fn bucket_of(value: i64) -> Option<usize> {
    RANGE_BUCKETS.iter().position(|(_, lower, upper)| {
        lower.map_or(true, |l| value >= l) && upper.map_or(true, |u| value < u)
    })
}

/// Range dimension entry from collected bucket counts. Empty buckets are
/// left out; `None` when nothing falls in any bucket.
pub fn range_dimension(counts: &RangeCounts, dim: &DimensionSettings, base_path: &str) -> Option<FacetDimension> {
    let facets: Vec<Facet> = RANGE_BUCKETS
        .iter()
        .zip(counts)
        .filter(|(_, count)| **count > 0)
        .map(|(&(label, lower, upper), &count)| {
            let constraint =
                Constraint::Range { lower: lower.map(RangeBound::inclusive), upper: upper.map(RangeBound::exclusive) };
            Facet { label: label.to_string(), count, link: drilldown_link(base_path, &dim.dimension, &constraint) }
        })
        .collect();
    (!facets.is_empty()).then(|| FacetDimension { name: dim.display_name.clone(), facets })
}
