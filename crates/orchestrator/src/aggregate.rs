use payrun_types::{Amount, LedgerEntry};
use std::collections::BTreeMap;

/// Net transfer owed to one beneficiary within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BeneficiaryTotal {
    pub beneficiary_id: String,
    pub amount: Amount,
    pub ledger_ids: Vec<String>,
}

/// Sum member entries per beneficiary. Disbursement is always per
/// beneficiary, never per entry.
///
/// Pure over its input; ordering is deterministic (beneficiary id
/// ascending) so a replayed execution issues transfers in the same order.
pub fn aggregate_by_beneficiary(entries: &[LedgerEntry]) -> Vec<BeneficiaryTotal> {
    let mut totals: BTreeMap<&str, BeneficiaryTotal> = BTreeMap::new();
    for entry in entries {
        totals
            .entry(entry.beneficiary_id.as_str())
            .and_modify(|t| {
                t.amount += entry.amount;
                t.ledger_ids.push(entry.id.clone());
            })
            .or_insert_with(|| BeneficiaryTotal {
                beneficiary_id: entry.beneficiary_id.clone(),
                amount: entry.amount,
                ledger_ids: vec![entry.id.clone()],
            });
    }
    totals.into_values().collect()
}
