//! Financial simulation engine.
//!
//! Deterministic unit economics and a 60-month customer/revenue simulation
//! for a lean, self-funded launch. The finance stage asks the generator for
//! levers and a cost structure only; every metric is computed here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of simulated months.
const SIMULATION_MONTHS: usize = 60;

/// Months per projection year.
const MONTHS_PER_YEAR: usize = 12;

/// Business constants used by the simulation.
///
/// The defaults model a bootstrapped founder with friends-and-family money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationAssumptions {
    /// Fixed monthly overhead assumed when no cost structure is supplied.
    pub default_fixed_costs: f64,
    /// Share of price kept as gross profit when variable costs exceed price.
    pub fallback_margin: f64,
    /// Monthly organic leads from founder effort.
    pub organic_leads: f64,
    /// Ad spend needed to buy one lead.
    pub cost_per_paid_lead: f64,
    /// Monthly churn rate.
    pub churn_rate: f64,
    /// Starting capital.
    pub seed_capital: f64,
    /// Runway reported when fixed costs are zero.
    pub runway_sentinel_months: f64,
    /// Acquisition multiplier while below the customer threshold.
    pub early_growth_factor: f64,
    /// Acquisition multiplier at or above the customer threshold.
    pub mature_growth_factor: f64,
    /// Customer count at which growth switches to the mature factor.
    pub growth_threshold_customers: f64,
}

impl Default for SimulationAssumptions {
    fn default() -> Self {
        Self {
            default_fixed_costs: 100.0,
            fallback_margin: 0.2,
            organic_leads: 300.0,
            cost_per_paid_lead: 1.5,
            churn_rate: 0.05,
            seed_capital: 50_000.0,
            runway_sentinel_months: 99.0,
            early_growth_factor: 1.15,
            mature_growth_factor: 1.05,
            growth_threshold_customers: 1000.0,
        }
    }
}

/// A bounded input lever.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lever {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Lever {
    pub fn new(value: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            value,
            min,
            max,
            step,
        }
    }

    /// A lever fixed at one value.
    pub fn fixed(value: f64) -> Self {
        Self::new(value, value, value, 0.0)
    }

    /// True when every field is finite and `min <= max`.
    pub fn is_well_formed(&self) -> bool {
        [self.value, self.min, self.max, self.step]
            .iter()
            .all(|v| v.is_finite())
            && self.min <= self.max
    }

    /// Value clamped into `[min, max]`.
    ///
    /// A non-finite value reads as 0; malformed bounds leave the value as is.
    pub fn effective_value(&self) -> f64 {
        if !self.value.is_finite() {
            return 0.0;
        }
        if self.is_well_formed() {
            self.value.clamp(self.min, self.max)
        } else {
            self.value
        }
    }
}

/// Pricing, acquisition spend and conversion levers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverSet {
    pub monthly_price: Lever,
    pub ad_spend: Lever,
    /// Conversion rate in percent (e.g. 2.5 for 2.5%).
    #[serde(alias = "conversion_rate")]
    pub conversion_rate_percent: Lever,
}

impl LeverSet {
    pub fn is_well_formed(&self) -> bool {
        self.monthly_price.is_well_formed()
            && self.ad_spend.is_well_formed()
            && self.conversion_rate_percent.is_well_formed()
    }
}

/// A monthly cost line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCategory {
    pub name: String,
    pub monthly_amount: f64,
    /// Variable costs are per-customer unit costs; the rest is fixed overhead.
    pub is_variable: bool,
}

impl CostCategory {
    pub fn fixed(name: impl Into<String>, monthly_amount: f64) -> Self {
        Self {
            name: name.into(),
            monthly_amount,
            is_variable: false,
        }
    }

    pub fn variable(name: impl Into<String>, monthly_amount: f64) -> Self {
        Self {
            name: name.into(),
            monthly_amount,
            is_variable: true,
        }
    }
}

/// Overall health of the unit economics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinancialStatus {
    Excellent,
    Good,
    Fair,
    Risk,
}

impl fmt::Display for FinancialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinancialStatus::Excellent => "Excellent",
            FinancialStatus::Good => "Good",
            FinancialStatus::Fair => "Fair",
            FinancialStatus::Risk => "Risk",
        };
        f.write_str(s)
    }
}

/// One aggregated projection year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionYear {
    /// 1-based year index.
    pub year_index: u8,
    pub revenue: f64,
    pub profit: f64,
    /// Customers at the end of the year, truncated.
    pub customer_count: u64,
}

/// Output of [`simulate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialProjection {
    pub fixed_costs: f64,
    pub variable_cost_per_customer: f64,
    pub gross_profit_per_customer: f64,
    pub new_customers_per_month: f64,
    pub cac: f64,
    pub ltv: f64,
    pub ltv_cac_ratio: f64,
    pub status: FinancialStatus,
    pub break_even_customers: u64,
    /// First month (1-based) with positive profit, if any.
    pub break_even_month: Option<u32>,
    /// Seed capital divided by fixed costs.
    pub runway_months: f64,
    /// Truncated runway, or 0 when the 60-month cash position is not positive.
    pub projected_runway_months: u32,
    pub cumulative_cash: f64,
    pub years: Vec<ProjectionYear>,
}

/// Runs the simulation with default assumptions.
pub fn simulate(levers: &LeverSet, costs: &[CostCategory]) -> FinancialProjection {
    simulate_with(levers, costs, &SimulationAssumptions::default())
}

/// Runs the simulation with explicit assumptions.
pub fn simulate_with(
    levers: &LeverSet,
    costs: &[CostCategory],
    assumptions: &SimulationAssumptions,
) -> FinancialProjection {
    let price = levers.monthly_price.effective_value();
    let ad_spend = levers.ad_spend.effective_value();
    let conversion = levers.conversion_rate_percent.effective_value();

    let (fixed_costs, variable_cost) = if costs.is_empty() {
        (assumptions.default_fixed_costs, 0.0)
    } else {
        costs.iter().fold((0.0, 0.0), |(fixed, variable), cost| {
            let amount = if cost.monthly_amount.is_finite() {
                cost.monthly_amount
            } else {
                0.0
            };
            if cost.is_variable {
                (fixed, variable + amount)
            } else {
                (fixed + amount, variable)
            }
        })
    };

    let mut gross_profit = price - variable_cost;
    if gross_profit <= 0.0 {
        gross_profit = price * assumptions.fallback_margin;
    }

    let paid_leads = if ad_spend > 0.0 {
        ad_spend / assumptions.cost_per_paid_lead
    } else {
        0.0
    };
    let new_customers = (assumptions.organic_leads + paid_leads) * (conversion / 100.0);

    let cac = if new_customers > 0.0 {
        ad_spend / new_customers
    } else {
        ad_spend
    };
    let ltv = gross_profit / assumptions.churn_rate;
    let ltv_cac_ratio = if cac > 0.0 { ltv / cac } else { 0.0 };

    let break_even_customers = if gross_profit > 0.0 {
        (fixed_costs / gross_profit).floor().max(0.0) as u64
    } else {
        0
    };

    let runway_months = if fixed_costs > 0.0 {
        assumptions.seed_capital / fixed_costs
    } else {
        assumptions.runway_sentinel_months
    };

    let status = if ltv_cac_ratio >= 3.0 && runway_months > 12.0 {
        FinancialStatus::Excellent
    } else if ltv_cac_ratio >= 1.5 {
        FinancialStatus::Good
    } else if ltv_cac_ratio >= 1.0 {
        FinancialStatus::Fair
    } else {
        FinancialStatus::Risk
    };

    let mut current = 0.0_f64;
    let mut cumulative_cash = assumptions.seed_capital;
    let mut break_even_month = None;
    let mut years = Vec::with_capacity(SIMULATION_MONTHS / MONTHS_PER_YEAR);
    let mut year_revenue = 0.0;
    let mut year_profit = 0.0;

    for month in 0..SIMULATION_MONTHS {
        let acquired = if month == 0 {
            new_customers
        } else if current < assumptions.growth_threshold_customers {
            new_customers * assumptions.early_growth_factor
        } else {
            new_customers * assumptions.mature_growth_factor
        };

        let churned = current * assumptions.churn_rate;
        current += acquired - churned;

        let revenue = current * price;
        let cost = fixed_costs + variable_cost * current + ad_spend;
        let profit = revenue - cost;

        year_revenue += revenue;
        year_profit += profit;
        cumulative_cash += profit;

        if profit > 0.0 && break_even_month.is_none() {
            break_even_month = Some(month as u32 + 1);
        }

        if (month + 1) % MONTHS_PER_YEAR == 0 {
            years.push(ProjectionYear {
                year_index: ((month + 1) / MONTHS_PER_YEAR) as u8,
                revenue: year_revenue,
                profit: year_profit,
                customer_count: current.max(0.0) as u64,
            });
            year_revenue = 0.0;
            year_profit = 0.0;
        }
    }

    let projected_runway_months = if cumulative_cash > 0.0 {
        runway_months.max(0.0) as u32
    } else {
        0
    };

    FinancialProjection {
        fixed_costs,
        variable_cost_per_customer: variable_cost,
        gross_profit_per_customer: gross_profit,
        new_customers_per_month: new_customers,
        cac,
        ltv,
        ltv_cac_ratio,
        status,
        break_even_customers,
        break_even_month,
        runway_months,
        projected_runway_months,
        cumulative_cash,
        years,
    }
}

/// Groups the digits of a whole number with spaces: `12345` -> `"12 345"`.
pub fn group_thousands(value: i64) -> String {
    let grouped = group_digits(value.unsigned_abs());
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

/// Formats a whole-euro amount: `12345.6` -> `"€12 346"`.
///
/// Amounts beyond the `i64` range saturate.
pub fn format_currency(amount: f64) -> String {
    let rounded = if amount.is_finite() { amount.round() as i64 } else { 0 };
    let grouped = group_digits(rounded.unsigned_abs());
    if rounded < 0 {
        format!("-€{}", grouped)
    } else {
        format!("€{}", grouped)
    }
}
