use crate::domain::payout::{Payout, PayoutId, SellerId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct PayoutRow<'a> {
    payout: PayoutId,
    seller: SellerId,
    amount: Decimal,
    status: String,
    transfer: Option<&'a str>,
    failure_reason: Option<&'a str>,
}

/// Writes payouts as CSV, one row per payout in id order.
pub struct PayoutWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PayoutWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payouts(&mut self, mut payouts: Vec<Payout>) -> Result<()> {
        payouts.sort_by_key(|p| p.id);
        for payout in &payouts {
            self.writer.serialize(PayoutRow {
                payout: payout.id,
                seller: payout.seller_id,
                amount: payout.amount.value(),
                status: payout.status.to_string(),
                transfer: payout.external_transfer_id.as_deref(),
                failure_reason: payout.failure_reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows_in_id_order() {
        let mut failed = Payout::new(2, 8, Amount::new(dec!(3)).unwrap());
        failed.fail("Driver returned null - payout creation failed".to_string());
        let pending = Payout::new(1, 7, Amount::new(dec!(12.50)).unwrap());

        let mut out = Vec::new();
        PayoutWriter::new(&mut out)
            .write_payouts(vec![failed, pending])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "payout,seller,amount,status,transfer,failure_reason");
        assert_eq!(lines[1], "1,7,12.50,pending,,");
        assert_eq!(
            lines[2],
            "2,8,3,failed,,Driver returned null - payout creation failed"
        );
    }
}
