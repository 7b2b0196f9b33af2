use std::ops::Bound;

use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, Term};
use tracing::debug;

use localdb_core::error::{IndexError, Result};

use crate::analyzer::AnalyzerSelector;
use crate::drilldown::{Constraint, Drilldown, RangeBound};
use crate::facet_schema::FacetSchema;
use crate::tantivy_utils::IndexFields;

/// Builds the executable query from free text plus drill-down constraints.
pub struct QueryPlanner<'a> {
    index: &'a Index,
    fields: &'a IndexFields,
    selector: &'a AnalyzerSelector,
    facet_schema: &'a FacetSchema,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(
        index: &'a Index,
        fields: &'a IndexFields,
        selector: &'a AnalyzerSelector,
        facet_schema: &'a FacetSchema,
    ) -> Self {
        Self { index, fields, selector, facet_schema }
    }

    pub fn plan(&self, text: &str, drilldown: &Drilldown) -> Result<Box<dyn Query>> {
        let base = self.text_query(text);
        if drilldown.is_empty() {
            return Ok(base);
        }
        let mut clauses = vec![(Occur::Must, base)];
        for (dimension, constraint) in drilldown {
            clauses.push((Occur::Must, self.constraint_query(dimension, constraint)?));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// Free text parsed once per content field and OR-ed together. Syntax
    /// errors are tolerated, whatever parsed is kept.
    pub fn text_query(&self, text: &str) -> Box<dyn Query> {
        let text = text.trim();
        if text.is_empty() {
            return Box::new(AllQuery);
        }
        let clauses: Vec<(Occur, Box<dyn Query>)> = self
            .selector
            .query_fields()
            .into_iter()
            .map(|field| {
                let parser = QueryParser::for_index(self.index, vec![field]);
                let (parsed, errors) = parser.parse_query_lenient(text);
                if !errors.is_empty() {
                    debug!(query = %text, errors = errors.len(), "lenient parse dropped parts of the query");
                }
                (Occur::Should, parsed)
            })
            .collect();
        Box::new(BooleanQuery::new(clauses))
    }

    pub fn constraint_query(&self, dimension: &str, constraint: &Constraint) -> Result<Box<dyn Query>> {
        debug!(dimension, constraint = %constraint, "drill-down constraint");
        match constraint {
            Constraint::Exact(label) => {
                let facet = self.facet_schema.facet_for(dimension, label);
                Ok(Box::new(TermQuery::new(Term::from_facet(self.fields.facets, &facet), IndexRecordOption::Basic)))
            }
            Constraint::Range { lower, upper } => self.range_query(dimension, *lower, *upper),
        }
    }

    pub fn range_query(
        &self,
        dimension: &str,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    ) -> Result<Box<dyn Query>> {
        let field = *self
            .fields
            .numeric
            .get(dimension)
            .ok_or_else(|| IndexError::QueryPlanning(format!("'{dimension}' is not a numeric dimension")))?;
        let bound = |b: Option<RangeBound>| match b {
            Some(RangeBound { value, inclusive: true }) => Bound::Included(Term::from_field_i64(field, value)),
            Some(RangeBound { value, inclusive: false }) => Bound::Excluded(Term::from_field_i64(field, value)),
            None => Bound::Unbounded,
        };
        Ok(Box::new(RangeQuery::new(bound(lower), bound(upper))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tantivy_utils::{build_schema, register_tokenizers};

    struct Fixture {
        index: Index,
        fields: IndexFields,
        selector: AnalyzerSelector,
        facet_schema: FacetSchema,
    }

    fn fixture() -> Fixture {
        let numeric = vec!["focal-length-35".to_string()];
        let index = Index::create_in_ram(build_schema(&numeric));
        register_tokenizers(&index);
        let fields = IndexFields::from_schema(&index.schema(), &numeric).expect("fields");
        let selector = AnalyzerSelector::new(&fields, &["en".to_string()]);
        Fixture { index, fields, selector, facet_schema: FacetSchema::new() }
    }

    #[test]
    fn range_on_non_numeric_dimension_is_rejected() {
        let f = fixture();
        let planner = QueryPlanner::new(&f.index, &f.fields, &f.selector, &f.facet_schema);
        let mut drilldown = Drilldown::new();
        drilldown.insert("author".to_string(), Constraint::Range { lower: Some(RangeBound::inclusive(1)), upper: None });
        assert!(matches!(planner.plan("x", &drilldown), Err(IndexError::QueryPlanning(_))));
    }

    #[test]
    fn garbage_text_still_plans() {
        let f = fixture();
        let planner = QueryPlanner::new(&f.index, &f.fields, &f.selector, &f.facet_schema);
        assert!(planner.plan("foo AND (bar", &Drilldown::new()).is_ok());
        assert!(planner.plan("   ", &Drilldown::new()).is_ok());
    }
}
