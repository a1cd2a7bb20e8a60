use axum::{extract::State, Json};
use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate};
use diesel::sql_types::{BigInt, Date, Nullable, Numeric, Text};
use diesel::QueryableByName;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use shared::*;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::extract::ApiQuery;
use crate::models::decimal_to_f64;

const SALES_BY_BRANCH: &str = "\
    SELECT branch, \
           COALESCE(SUM(revenue), 0) AS revenue, \
           COALESCE(SUM(quantity), 0) AS units, \
           COUNT(DISTINCT order_ref) AS orders \
    FROM odoo_sales \
    WHERE date BETWEEN $1 AND $2 \
    GROUP BY branch";

const WASTE_COST_BY_BRANCH: &str = "\
    SELECT branch, COALESCE(SUM(cost), 0) AS cost \
    FROM odoo_waste \
    WHERE date BETWEEN $1 AND $2 \
    GROUP BY branch";

const SALES_WITH_RECIPE_COST: &str = "\
    SELECT s.branch, s.product, \
           COALESCE(SUM(s.quantity), 0) AS quantity, \
           COALESCE(SUM(s.revenue), 0) AS revenue, \
           r.cost_per_unit \
    FROM odoo_sales s \
    LEFT JOIN ( \
        SELECT LOWER(product) AS product_key, AVG(cost_per_unit) AS cost_per_unit \
        FROM odoo_recipe \
        GROUP BY LOWER(product) \
    ) r ON r.product_key = LOWER(s.product) \
    WHERE s.date BETWEEN $1 AND $2 \
    GROUP BY s.branch, s.product, r.cost_per_unit";

const TRANSFERRED: &str = "\
    SELECT branch, product, COALESCE(SUM(quantity), 0) AS quantity \
    FROM odoo_transfer WHERE date BETWEEN $1 AND $2 GROUP BY branch, product";

const SOLD: &str = "\
    SELECT branch, product, COALESCE(SUM(quantity), 0) AS quantity \
    FROM odoo_sales WHERE date BETWEEN $1 AND $2 GROUP BY branch, product";

const WASTED: &str = "\
    SELECT branch, product, COALESCE(SUM(quantity), 0) AS quantity \
    FROM odoo_waste WHERE date BETWEEN $1 AND $2 GROUP BY branch, product";

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub branch: Option<String>,
}

#[derive(QueryableByName)]
struct SalesRow {
    #[diesel(sql_type = Text)]
    branch: String,
    #[diesel(sql_type = Numeric)]
    revenue: BigDecimal,
    #[diesel(sql_type = Numeric)]
    units: BigDecimal,
    #[diesel(sql_type = BigInt)]
    orders: i64,
}

#[derive(QueryableByName)]
struct WasteCostRow {
    #[diesel(sql_type = Text)]
    branch: String,
    #[diesel(sql_type = Numeric)]
    cost: BigDecimal,
}

#[derive(QueryableByName)]
struct ProductSalesRow {
    #[diesel(sql_type = Text)]
    branch: String,
    #[diesel(sql_type = Text)]
    product: String,
    #[diesel(sql_type = Numeric)]
    quantity: BigDecimal,
    #[diesel(sql_type = Numeric)]
    revenue: BigDecimal,
    #[diesel(sql_type = Nullable<Numeric>)]
    cost_per_unit: Option<BigDecimal>,
}

#[derive(QueryableByName)]
struct QuantityRow {
    #[diesel(sql_type = Text)]
    branch: String,
    #[diesel(sql_type = Text)]
    product: String,
    #[diesel(sql_type = Numeric)]
    quantity: BigDecimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub previous_start: NaiveDate,
    pub previous_end: NaiveDate,
    #[serde(flatten)]
    pub report: SalesReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(flatten)]
    pub report: WasteReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lines: Vec<VarianceLine>,
}

/// Which branch names a request may see: the requested one if any, limited
/// to the caller's own branches.
struct BranchScope<'a> {
    user: &'a AuthUser,
    requested: Option<String>,
}

impl<'a> BranchScope<'a> {
    fn new(user: &'a AuthUser, query: &PeriodQuery) -> ApiResult<Self> {
        if query.start > query.end {
            return Err(ApiError::BadRequest("start must not be after end".to_string()));
        }
        let requested = query.branch.as_deref().map(str::trim).filter(|b| !b.is_empty());
        if let Some(branch) = requested {
            if !user.0.can_access_branch_named(branch) {
                return Err(ApiError::Forbidden(format!("no access to branch {}", branch)));
            }
        }
        Ok(Self {
            user,
            requested: requested.map(normalize_branch_name),
        })
    }

    fn allows(&self, branch: &str) -> bool {
        if let Some(requested) = &self.requested {
            if &normalize_branch_name(branch) != requested {
                return false;
            }
        }
        self.user.0.can_access_branch_named(branch)
    }
}

/// The period of equal length that ends the day before `start`.
/// `None` when that period falls outside the representable date range.
fn previous_period(start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let length = end - start;
    let previous_end = start.checked_sub_signed(Duration::days(1))?;
    Some((previous_end.checked_sub_signed(length)?, previous_end))
}

async fn fetch_sales(pool: &DbPool, start: NaiveDate, end: NaiveDate) -> ApiResult<Vec<SalesRow>> {
    let mut conn = pool.get().await?;
    let rows = diesel::sql_query(SALES_BY_BRANCH)
        .bind::<Date, _>(start)
        .bind::<Date, _>(end)
        .load::<SalesRow>(&mut conn)
        .await?;
    Ok(rows)
}

async fn fetch_waste_cost(
    pool: &DbPool,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<WasteCostRow>> {
    let mut conn = pool.get().await?;
    let rows = diesel::sql_query(WASTE_COST_BY_BRANCH)
        .bind::<Date, _>(start)
        .bind::<Date, _>(end)
        .load::<WasteCostRow>(&mut conn)
        .await?;
    Ok(rows)
}

async fn fetch_product_sales(
    pool: &DbPool,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<ProductSalesRow>> {
    let mut conn = pool.get().await?;
    let rows = diesel::sql_query(SALES_WITH_RECIPE_COST)
        .bind::<Date, _>(start)
        .bind::<Date, _>(end)
        .load::<ProductSalesRow>(&mut conn)
        .await?;
    Ok(rows)
}

async fn fetch_quantities(
    pool: &DbPool,
    statement: &'static str,
    start: NaiveDate,
    end: NaiveDate,
) -> ApiResult<Vec<QuantityRow>> {
    let mut conn = pool.get().await?;
    let rows = diesel::sql_query(statement)
        .bind::<Date, _>(start)
        .bind::<Date, _>(end)
        .load::<QuantityRow>(&mut conn)
        .await?;
    Ok(rows)
}

fn to_branch_sales(rows: Vec<SalesRow>, scope: &BranchScope) -> Vec<BranchSales> {
    rows.into_iter()
        .filter(|row| scope.allows(&row.branch))
        .map(|row| BranchSales {
            metrics: SalesMetrics::new(
                decimal_to_f64(&row.revenue),
                decimal_to_f64(&row.units),
                row.orders,
            ),
            branch: row.branch,
        })
        .collect()
}

fn to_product_quantities(rows: Vec<QuantityRow>, scope: &BranchScope) -> Vec<ProductQuantity> {
    rows.into_iter()
        .filter(|row| scope.allows(&row.branch))
        .map(|row| ProductQuantity {
            quantity: decimal_to_f64(&row.quantity),
            branch: row.branch,
            product: row.product,
        })
        .collect()
}

/// GET /api/analytics/sales?start=&end=&branch=
pub async fn sales_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Json<SalesSummary>> {
    let scope = BranchScope::new(&user, &query)?;
    let (previous_start, previous_end) = previous_period(query.start, query.end)
        .ok_or_else(|| ApiError::BadRequest("period is out of range".to_string()))?;

    let (current, previous) = futures::try_join!(
        fetch_sales(&state.pool, query.start, query.end),
        fetch_sales(&state.pool, previous_start, previous_end),
    )?;

    let report = sales_report(
        &to_branch_sales(current, &scope),
        &to_branch_sales(previous, &scope),
    );
    Ok(Json(SalesSummary {
        start: query.start,
        end: query.end,
        previous_start,
        previous_end,
        report,
    }))
}

/// GET /api/analytics/waste?start=&end=&branch=
pub async fn waste_summary(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Json<WasteSummary>> {
    let scope = BranchScope::new(&user, &query)?;

    let (waste_rows, sales_rows) = futures::try_join!(
        fetch_waste_cost(&state.pool, query.start, query.end),
        fetch_product_sales(&state.pool, query.start, query.end),
    )?;

    let waste: Vec<(String, f64)> = waste_rows
        .into_iter()
        .filter(|row| scope.allows(&row.branch))
        .map(|row| (row.branch, decimal_to_f64(&row.cost)))
        .collect();
    let sales: Vec<ProductSales> = sales_rows
        .into_iter()
        .filter(|row| scope.allows(&row.branch))
        .map(|row| ProductSales {
            quantity: decimal_to_f64(&row.quantity),
            revenue: decimal_to_f64(&row.revenue),
            unit_cost: row.cost_per_unit.as_ref().map(decimal_to_f64),
            branch: row.branch,
            product: row.product,
        })
        .collect();

    let report = waste_report(&waste, &sales);
    if report.totals.cogs_estimated {
        tracing::debug!(
            "Waste summary {}..{} used the revenue fallback for some products",
            query.start,
            query.end
        );
    }
    Ok(Json(WasteSummary {
        start: query.start,
        end: query.end,
        report,
    }))
}

/// GET /api/analytics/waste/variance?start=&end=&branch=
pub async fn branch_variance(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PeriodQuery>,
) -> ApiResult<Json<VarianceSummary>> {
    let scope = BranchScope::new(&user, &query)?;

    let (received, sold, wasted) = futures::try_join!(
        fetch_quantities(&state.pool, TRANSFERRED, query.start, query.end),
        fetch_quantities(&state.pool, SOLD, query.start, query.end),
        fetch_quantities(&state.pool, WASTED, query.start, query.end),
    )?;

    let lines = variance_report(
        &to_product_quantities(received, &scope),
        &to_product_quantities(sold, &scope),
        &to_product_quantities(wasted, &scope),
    );
    Ok(Json(VarianceSummary {
        start: query.start,
        end: query.end,
        lines,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn previous_period_has_equal_length() {
        assert_eq!(
            previous_period(date("2024-03-08"), date("2024-03-14")),
            Some((date("2024-03-01"), date("2024-03-07")))
        );
        assert_eq!(
            previous_period(date("2024-03-01"), date("2024-03-01")),
            Some((date("2024-02-29"), date("2024-02-29")))
        );
    }

    #[test]
    fn previous_period_before_the_first_date_is_none() {
        assert_eq!(previous_period(NaiveDate::MIN, NaiveDate::MIN), None);
        assert_eq!(previous_period(date("2024-03-01"), NaiveDate::MAX), None);
    }

    fn user(role: Role, branches: &[&str]) -> AuthUser {
        AuthUser(Actor {
            email: "someone@example.com".into(),
            role,
            branches: branches.iter().map(|b| b.to_string()).collect(),
            station_assignment: None,
        })
    }

    fn query(branch: Option<&str>) -> PeriodQuery {
        PeriodQuery {
            start: date("2024-03-01"),
            end: date("2024-03-07"),
            branch: branch.map(str::to_string),
        }
    }

    #[test]
    fn scope_limits_branch_users_to_their_branches() {
        let manager = user(Role::BranchManager, &["downtown"]);
        let scope = BranchScope::new(&manager, &query(None)).unwrap();
        assert!(scope.allows("Downtown Branch"));
        assert!(!scope.allows("Airport"));

        assert!(matches!(
            BranchScope::new(&manager, &query(Some("Airport"))),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn scope_narrows_to_requested_branch() {
        let admin = user(Role::Admin, &[]);
        let scope = BranchScope::new(&admin, &query(Some("airport"))).unwrap();
        assert!(scope.allows("Airport Branch"));
        assert!(!scope.allows("Downtown"));
    }

    #[test]
    fn inverted_period_is_rejected() {
        let admin = user(Role::Admin, &[]);
        let mut q = query(None);
        q.start = date("2024-03-10");
        assert!(matches!(BranchScope::new(&admin, &q), Err(ApiError::BadRequest(_))));
    }
}
