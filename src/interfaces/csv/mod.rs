pub mod commission_reader;
pub mod payout_writer;
