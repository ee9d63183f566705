use crate::domain::money::Amount;
use crate::domain::order::OrderId;
use crate::domain::payout::{Commission, CommissionId, CommissionStatus, SellerId};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of a commissions CSV: `commission, order, seller, amount`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommissionRecord {
    pub commission: CommissionId,
    pub order: OrderId,
    pub seller: SellerId,
    pub amount: Amount,
}

impl From<CommissionRecord> for Commission {
    fn from(record: CommissionRecord) -> Self {
        Commission {
            id: record.commission,
            order_id: record.order,
            seller_id: record.seller,
            amount: record.amount,
            status: CommissionStatus::Pending,
            payout_id: None,
        }
    }
}

/// Reads unpaid commissions from a CSV source.
///
/// Whitespace around fields is trimmed and short rows are tolerated; a row that
/// fails to deserialize (including a non-positive amount) surfaces as an `Err`
/// item without ending the stream.
pub struct CommissionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommissionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes commissions.
    pub fn commissions(self) -> impl Iterator<Item = Result<Commission>> {
        self.reader
            .into_deserialize::<CommissionRecord>()
            .map(|result| result.map(Commission::from).map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "commission, order, seller, amount\n1, 10, 7, 12.50\n2, 11, 8, 3";
        let results: Vec<Result<Commission>> =
            CommissionReader::new(data.as_bytes()).commissions().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.seller_id, 7);
        assert_eq!(first.amount.value(), dec!(12.50));
        assert_eq!(first.status, CommissionStatus::Pending);
        assert!(first.payout_id.is_none());
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let data = "commission, order, seller, amount\n1, 10, 7, -5\n2, 11, x, 3\n3, 12, 7, 1";
        let results: Vec<Result<Commission>> =
            CommissionReader::new(data.as_bytes()).commissions().collect();

        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().id, 3);
    }
}
