use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::text::normalize_branch_name;

/// Share of revenue used as cost of goods when no recipe cost matches a
/// product. Responses flag figures that relied on it.
pub const COGS_FALLBACK_RATIO: f64 = 0.30;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Period-over-period change in percent.
pub fn calc_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round2((current - previous) / previous * 100.0)
}

pub fn waste_pct(waste_cost: f64, cogs: f64) -> f64 {
    if cogs <= 0.0 {
        return 0.0;
    }
    round2(waste_cost / cogs * 100.0)
}

/// Cost of goods for one product's sales. Returns the amount and whether the
/// revenue fallback was used.
pub fn estimated_cogs(quantity: f64, revenue: f64, unit_cost: Option<f64>) -> (f64, bool) {
    match unit_cost {
        Some(cost) => (quantity * cost, false),
        None => (revenue * COGS_FALLBACK_RATIO, true),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesMetrics {
    pub revenue: f64,
    pub units: f64,
    pub orders: i64,
    pub aov: f64,
}

impl SalesMetrics {
    pub fn new(revenue: f64, units: f64, orders: i64) -> Self {
        let aov = if orders > 0 { round2(revenue / orders as f64) } else { 0.0 };
        Self { revenue: round2(revenue), units, orders, aov }
    }

    pub fn merge(self, other: SalesMetrics) -> Self {
        Self::new(
            self.revenue + other.revenue,
            self.units + other.units,
            self.orders + other.orders,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesChange {
    pub revenue: f64,
    pub units: f64,
    pub orders: f64,
    pub aov: f64,
}

impl SalesChange {
    pub fn between(current: &SalesMetrics, previous: &SalesMetrics) -> Self {
        Self {
            revenue: calc_change(current.revenue, previous.revenue),
            units: calc_change(current.units, previous.units),
            orders: calc_change(current.orders as f64, previous.orders as f64),
            aov: calc_change(current.aov, previous.aov),
        }
    }
}

/// Received-versus-sold balance for one product at one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarianceLine {
    pub branch: String,
    pub product: String,
    pub received: f64,
    pub sold: f64,
    pub wasted: f64,
    pub variance: f64,
    pub variance_pct: f64,
}

impl VarianceLine {
    pub fn new(branch: String, product: String, received: f64, sold: f64, wasted: f64) -> Self {
        let variance = received - sold - wasted;
        let variance_pct = if received > 0.0 { round2(variance / received * 100.0) } else { 0.0 };
        Self { branch, product, received, sold, wasted, variance, variance_pct }
    }
}

/// One branch's sales figures for a period.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSales {
    pub branch: String,
    pub metrics: SalesMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub branch: Option<String>,
    pub current: SalesMetrics,
    pub previous: SalesMetrics,
    pub change: SalesChange,
}

impl PeriodComparison {
    fn new(branch: Option<String>, current: SalesMetrics, previous: SalesMetrics) -> Self {
        let change = SalesChange::between(&current, &previous);
        Self { branch, current, previous, change }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub totals: PeriodComparison,
    pub branches: Vec<PeriodComparison>,
}

/// Lines up two periods branch by branch. Branch names are matched loosely,
/// and a branch missing from one period counts as zero there.
pub fn sales_report(current: &[BranchSales], previous: &[BranchSales]) -> SalesReport {
    let mut by_branch: BTreeMap<String, (String, SalesMetrics, SalesMetrics)> = BTreeMap::new();
    for row in current {
        let entry = by_branch
            .entry(normalize_branch_name(&row.branch))
            .or_insert_with(|| {
                (row.branch.clone(), SalesMetrics::default(), SalesMetrics::default())
            });
        entry.1 = entry.1.merge(row.metrics);
    }
    for row in previous {
        let entry = by_branch
            .entry(normalize_branch_name(&row.branch))
            .or_insert_with(|| {
                (row.branch.clone(), SalesMetrics::default(), SalesMetrics::default())
            });
        entry.2 = entry.2.merge(row.metrics);
    }

    let mut total_current = SalesMetrics::default();
    let mut total_previous = SalesMetrics::default();
    let mut branches = Vec::with_capacity(by_branch.len());
    for (_, (name, cur, prev)) in by_branch {
        total_current = total_current.merge(cur);
        total_previous = total_previous.merge(prev);
        branches.push(PeriodComparison::new(Some(name), cur, prev));
    }
    branches.sort_by(|a, b| b.current.revenue.total_cmp(&a.current.revenue));

    SalesReport {
        totals: PeriodComparison::new(None, total_current, total_previous),
        branches,
    }
}

/// Sales of one product at one branch, with the recipe cost when one matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSales {
    pub branch: String,
    pub product: String,
    pub quantity: f64,
    pub revenue: f64,
    pub unit_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteLine {
    pub branch: Option<String>,
    pub waste_cost: f64,
    pub cogs: f64,
    pub waste_pct: f64,
    pub cogs_estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteReport {
    pub totals: WasteLine,
    pub branches: Vec<WasteLine>,
}

/// Waste cost against estimated cost of goods, per branch and overall.
/// `waste` pairs a branch name with its waste cost for the period.
pub fn waste_report(waste: &[(String, f64)], sales: &[ProductSales]) -> WasteReport {
    #[derive(Default)]
    struct Acc {
        name: String,
        waste_cost: f64,
        cogs: f64,
        estimated: bool,
    }

    let mut by_branch: BTreeMap<String, Acc> = BTreeMap::new();
    for (branch, cost) in waste {
        let acc = by_branch.entry(normalize_branch_name(branch)).or_insert_with(|| Acc {
            name: branch.clone(),
            ..Default::default()
        });
        acc.waste_cost += cost;
    }
    for line in sales {
        let (cogs, estimated) = estimated_cogs(line.quantity, line.revenue, line.unit_cost);
        let acc = by_branch.entry(normalize_branch_name(&line.branch)).or_insert_with(|| Acc {
            name: line.branch.clone(),
            ..Default::default()
        });
        acc.cogs += cogs;
        acc.estimated |= estimated;
    }

    let mut totals = Acc::default();
    let mut branches = Vec::with_capacity(by_branch.len());
    for (_, acc) in by_branch {
        totals.waste_cost += acc.waste_cost;
        totals.cogs += acc.cogs;
        totals.estimated |= acc.estimated;
        branches.push(WasteLine {
            branch: Some(acc.name),
            waste_cost: round2(acc.waste_cost),
            cogs: round2(acc.cogs),
            waste_pct: waste_pct(acc.waste_cost, acc.cogs),
            cogs_estimated: acc.estimated,
        });
    }
    branches.sort_by(|a, b| b.waste_pct.total_cmp(&a.waste_pct));

    WasteReport {
        totals: WasteLine {
            branch: None,
            waste_cost: round2(totals.waste_cost),
            cogs: round2(totals.cogs),
            waste_pct: waste_pct(totals.waste_cost, totals.cogs),
            cogs_estimated: totals.estimated,
        },
        branches,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuantity {
    pub branch: String,
    pub product: String,
    pub quantity: f64,
}

/// Joins transfers, sales and waste on (branch, product). Branches match
/// loosely and products case-insensitively; the first spelling seen is kept
/// for display.
pub fn variance_report(
    received: &[ProductQuantity],
    sold: &[ProductQuantity],
    wasted: &[ProductQuantity],
) -> Vec<VarianceLine> {
    let mut lines: BTreeMap<(String, String), (String, String, [f64; 3])> = BTreeMap::new();
    for (slot, rows) in [received, sold, wasted].into_iter().enumerate() {
        for row in rows {
            let key = (normalize_branch_name(&row.branch), row.product.trim().to_lowercase());
            let entry = lines
                .entry(key)
                .or_insert_with(|| (row.branch.clone(), row.product.trim().to_string(), [0.0; 3]));
            entry.2[slot] += row.quantity;
        }
    }

    let mut report: Vec<VarianceLine> = lines
        .into_values()
        .map(|(branch, product, [received, sold, wasted])| {
            VarianceLine::new(branch, product, received, sold, wasted)
        })
        .collect();
    report.sort_by(|a, b| b.variance.abs().total_cmp(&a.variance.abs()));
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_handles_zero_baseline() {
        assert_eq!(calc_change(0.0, 0.0), 0.0);
        assert_eq!(calc_change(42.0, 0.0), 100.0);
        assert_eq!(calc_change(-5.0, 0.0), 0.0);
    }

    #[test]
    fn change_is_relative_to_previous() {
        assert_eq!(calc_change(110.0, 100.0), 10.0);
        assert_eq!(calc_change(50.0, 200.0), -75.0);
        assert_eq!(calc_change(1.0, 3.0), -66.67);
    }

    #[test]
    fn waste_pct_rounds_and_guards_zero_cogs() {
        assert_eq!(waste_pct(25.0, 0.0), 0.0);
        assert_eq!(waste_pct(12.5, 250.0), 5.0);
        assert_eq!(waste_pct(1.0, 3.0), 33.33);
    }

    #[test]
    fn cogs_prefers_recipe_cost() {
        assert_eq!(estimated_cogs(10.0, 500.0, Some(12.0)), (120.0, false));
        let (cogs, estimated) = estimated_cogs(10.0, 500.0, None);
        assert!(estimated);
        assert!((cogs - 150.0).abs() < 1e-9);
    }

    #[test]
    fn aov_is_zero_without_orders() {
        let metrics = SalesMetrics::new(100.0, 4.0, 0);
        assert_eq!(metrics.aov, 0.0);
        let merged = metrics.merge(SalesMetrics::new(300.0, 6.0, 4));
        assert_eq!(merged.orders, 4);
        assert_eq!(merged.aov, 100.0);
    }

    #[test]
    fn variance_pct_relative_to_received() {
        let line = VarianceLine::new("downtown".into(), "Samosa".into(), 100.0, 80.0, 5.0);
        assert_eq!(line.variance, 15.0);
        assert_eq!(line.variance_pct, 15.0);

        let none_received = VarianceLine::new("downtown".into(), "Samosa".into(), 0.0, 3.0, 0.0);
        assert_eq!(none_received.variance_pct, 0.0);
    }

    #[test]
    fn sales_report_matches_branches_across_periods() {
        let sales = |branch: &str, revenue: f64, units: f64, orders: i64| BranchSales {
            branch: branch.into(),
            metrics: SalesMetrics::new(revenue, units, orders),
        };
        let current = vec![
            sales("Downtown Branch", 1100.0, 50.0, 10),
            sales("Airport", 300.0, 12.0, 3),
        ];
        let previous = vec![sales("downtown", 1000.0, 40.0, 10)];

        let report = sales_report(&current, &previous);
        assert_eq!(report.branches.len(), 2);
        let downtown = &report.branches[0];
        assert_eq!(downtown.branch.as_deref(), Some("Downtown Branch"));
        assert_eq!(downtown.change.revenue, 10.0);
        assert_eq!(downtown.change.units, 25.0);

        let airport = &report.branches[1];
        assert_eq!(airport.previous, SalesMetrics::default());
        assert_eq!(airport.change.revenue, 100.0);

        assert_eq!(report.totals.current.revenue, 1400.0);
        assert_eq!(report.totals.current.orders, 13);
        assert_eq!(report.totals.change.revenue, 40.0);
    }

    #[test]
    fn waste_report_mixes_recipe_and_fallback_cogs() {
        let waste = vec![("Downtown".to_string(), 30.0), ("Airport".to_string(), 5.0)];
        let line = |branch: &str, product: &str, quantity: f64, revenue: f64, unit_cost| {
            ProductSales {
                branch: branch.into(),
                product: product.into(),
                quantity,
                revenue,
                unit_cost,
            }
        };
        let sales = vec![
            line("Downtown", "Biryani", 20.0, 400.0, Some(5.0)),
            line("Downtown", "Lassi", 10.0, 100.0, None),
            line("Airport Branch", "Biryani", 10.0, 200.0, Some(5.0)),
        ];

        let report = waste_report(&waste, &sales);
        let branch = |name: &str| {
            report
                .branches
                .iter()
                .find(|b| b.branch.as_deref() == Some(name))
                .unwrap()
        };
        let downtown = branch("Downtown");
        assert_eq!(downtown.cogs, 130.0);
        assert_eq!(downtown.waste_pct, 23.08);
        assert!(downtown.cogs_estimated);

        let airport = branch("Airport");
        assert_eq!(airport.cogs, 50.0);
        assert_eq!(airport.waste_pct, 10.0);
        assert!(!airport.cogs_estimated);

        assert_eq!(report.totals.waste_cost, 35.0);
        assert_eq!(report.totals.cogs, 180.0);
        assert_eq!(report.totals.waste_pct, 19.44);
        assert!(report.totals.cogs_estimated);
    }

    #[test]
    fn waste_without_sales_has_zero_pct() {
        let report = waste_report(&[("Kiosk".to_string(), 12.0)], &[]);
        assert_eq!(report.branches[0].cogs, 0.0);
        assert_eq!(report.branches[0].waste_pct, 0.0);
    }

    #[test]
    fn variance_joins_sources_by_branch_and_product() {
        let pq = |branch: &str, product: &str, quantity: f64| ProductQuantity {
            branch: branch.into(),
            product: product.into(),
            quantity,
        };
        let received = vec![pq("Downtown Branch", "Samosa", 100.0), pq("Airport", "Samosa", 40.0)];
        let sold = vec![
            pq("downtown", "samosa", 70.0),
            pq("Airport", "Samosa", 40.0),
            pq("Airport", "Chai", 5.0),
        ];
        let wasted = vec![pq("DOWNTOWN", "Samosa ", 10.0)];

        let report = variance_report(&received, &sold, &wasted);
        assert_eq!(report.len(), 3);

        let downtown = &report[0];
        assert_eq!((downtown.received, downtown.sold, downtown.wasted), (100.0, 70.0, 10.0));
        assert_eq!(downtown.variance, 20.0);
        assert_eq!(downtown.variance_pct, 20.0);

        let chai = report.iter().find(|l| l.product == "Chai").unwrap();
        assert_eq!(chai.variance, -5.0);
        assert_eq!(chai.variance_pct, 0.0);
    }
}
