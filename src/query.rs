//! Declarative query building and the coordinate predicates.
//!
//! Derived tables and views are described with [`Query`] values (select
//! list, source, join predicates, filter, ordering) and rendered to SQL in
//! one place. The overlap and distance predicates exist both as named Rust
//! functions and as clause builders so the semantics stay testable outside
//! the engine.

/// Distance assigned when either input coordinate is missing.
///
/// Stands in for +infinity; kept as a finite sentinel so it sorts and
/// filters like any other distance.
pub const NULL_COORDINATE_DISTANCE: f64 = 9e9;

/// Two closed segments intersect when each segment's start is at or before
/// the other's end.
pub fn segments_overlap(a1: i64, a2: i64, b1: i64, b2: i64) -> bool {
    a1 <= b2 && b1 <= a2
}

/// Distance between an input segment and a gene segment.
///
/// Zero on overlap; [`NULL_COORDINATE_DISTANCE`] when either input
/// coordinate is missing; otherwise the maximum of the two cross-differences
/// `|a1 - b2|` and `|a2 - b1|`. The maximum (not the minimum gap) is the
/// documented ranking metric and is reproduced as such.
pub fn segment_distance(a1: Option<i64>, a2: Option<i64>, b1: i64, b2: i64) -> f64 {
    match (a1, a2) {
        (Some(a1), Some(a2)) => {
            if segments_overlap(a1, a2, b1, b2) {
                0.0
            } else {
                (a1 - b2).abs().max((a2 - b1).abs()) as f64
            }
        }
        _ => NULL_COORDINATE_DISTANCE,
    }
}

/// Quote an identifier for the store's SQL dialect.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL rendering of the segment-overlap predicate over column expressions.
pub fn overlap_sql(a1: &str, a2: &str, b1: &str, b2: &str) -> String {
    format!("({a1} <= {b2} AND {b1} <= {a2})")
}

/// SQL rendering of the distance metric over column expressions.
pub fn distance_sql(a1: &str, a2: &str, b1: &str, b2: &str) -> String {
    format!(
        "(CASE WHEN {overlap} THEN 0 \
         WHEN {a1} IS NULL OR {a2} IS NULL THEN {null_distance:e} \
         ELSE MAX(ABS({a1} - {b2}), ABS({a2} - {b1})) END)",
        overlap = overlap_sql(a1, a2, b1, b2),
        null_distance = NULL_COORDINATE_DISTANCE,
    )
}

/// Group an integer's digits in threes: `1234567` becomes `1,234,567`.
///
/// Registered in the store as the scalar SQL function `GROUP_DIGITS`.
pub fn group_digits(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    let lead = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && i % 3 == lead % 3 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// A declarative SELECT over existing datasets.
#[derive(Debug, Clone, Default)]
pub struct Query {
    select: Vec<String>,
    from: Option<String>,
    joins: Vec<String>,
    filters: Vec<String>,
    order: Vec<String>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    /// Add a select-list expression.
    pub fn select(mut self, expr: &str) -> Self {
        self.select.push(expr.to_string());
        self
    }

    /// Add a select-list expression under an alias.
    pub fn select_as(mut self, expr: &str, alias: &str) -> Self {
        self.select.push(format!("{} AS {}", expr, alias));
        self
    }

    /// Set the source dataset, with an alias for predicate references.
    pub fn from(mut self, dataset: &str, alias: &str) -> Self {
        self.from = Some(format!("{} {}", quote_ident(dataset), alias));
        self
    }

    /// Add an inner join against another dataset.
    pub fn inner_join(mut self, dataset: &str, alias: &str, on: &str) -> Self {
        self.joins
            .push(format!("INNER JOIN {} {} ON ({})", quote_ident(dataset), alias, on));
        self
    }

    /// Add a filter predicate (conjunctive).
    pub fn filter(mut self, predicate: &str) -> Self {
        self.filters.push(predicate.to_string());
        self
    }

    /// Add ordering columns (appended in call order).
    pub fn order_by(mut self, columns: &str) -> Self {
        self.order.push(columns.to_string());
        self
    }

    /// Render to SQL.
    pub fn to_sql(&self) -> String {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(", ")
        };
        let mut sql = format!("SELECT {}", select);
        if let Some(from) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        sql
    }
}
