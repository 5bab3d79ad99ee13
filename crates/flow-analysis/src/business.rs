//! Single-business report: issuance, redemption, swap outflow, and the
//! amount of the business's own token that found its way back to the owner.

use std::collections::HashMap;

use eyre::Result;
use flow_data::{Amount, Business, Event, EventLedger};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::rank::{top_desc, Ranked};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessReport {
    pub owner: String,
    pub brand: String,
    pub token: String,
    /// Sum of reward amounts issued.
    pub issued: Amount,
    /// Sum of redemptions back to the business.
    pub redeemed: Amount,
    /// Sum of `fromAmount` over swaps out of the business's token.
    pub swapped_out: Amount,
    /// Ledger amount of the business's token arriving at the owner address.
    pub back_flow: Amount,
    pub redeemed_pct: String,
    pub swapped_pct: String,
    pub top_recipients: Vec<Ranked<Amount>>,
    pub top_redeemers: Vec<Ranked<Amount>>,
}

/// `num / denom` as a percentage with two decimals, `"0 %"` when `denom` is 0.
pub fn percent(num: Amount, denom: Amount) -> String {
    if denom == 0.0 {
        return "0 %".to_string();
    }
    format!("{:.2} %", num / denom * 100.0)
}

/// Builds the report for one resolved business.
pub fn business_report(ledger: &EventLedger, business: &Business, top: usize) -> BusinessReport {
    let owned_by = |addr: &str| addr.eq_ignore_ascii_case(&business.owner);

    let mut issued: Amount = 0.0;
    let mut redeemed: Amount = 0.0;
    let mut swapped_out: Amount = 0.0;
    let mut recipients: HashMap<&str, Amount> = HashMap::new();
    let mut redeemers: HashMap<&str, Amount> = HashMap::new();

    for event in ledger.events() {
        match event {
            Event::Reward(r) if owned_by(&r.business) => {
                issued += r.amount;
                *recipients.entry(&r.user).or_default() += r.amount;
            }
            Event::Redeem(r) if owned_by(&r.business) => {
                redeemed += r.amount;
                *redeemers.entry(&r.user).or_default() += r.amount;
            }
            Event::Swap(s) if owned_by(&s.from_business) => {
                swapped_out += s.from_amount;
            }
            _ => {}
        }
    }

    let back_flow: Amount = ledger
        .events()
        .iter()
        .flat_map(Event::legs)
        .filter(|leg| owned_by(leg.to) && leg.token.eq_ignore_ascii_case(&business.token))
        .map(|leg| leg.amount)
        .sum();

    let ranked = |m: HashMap<&str, Amount>| {
        top_desc(m.into_iter().map(|(k, v)| (k.to_string(), v)), top)
    };

    BusinessReport {
        owner: business.owner.clone(),
        brand: business.brand.clone(),
        token: business.token.clone(),
        issued,
        redeemed,
        swapped_out,
        back_flow,
        redeemed_pct: percent(redeemed, issued),
        swapped_pct: percent(swapped_out, issued),
        top_recipients: ranked(recipients),
        top_redeemers: ranked(redeemers),
    }
}

/// Report for the business selected in `config`.
///
/// # Errors
/// Returns error if no selector is configured or it matches no business.
pub fn selected_business_report(
    ledger: &EventLedger,
    config: &AnalysisConfig,
) -> Result<BusinessReport> {
    let business = config.selected_business(ledger)?;
    Ok(business_report(ledger, business, config.top))
}
