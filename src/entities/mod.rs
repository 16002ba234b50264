pub mod coupon;
pub mod coupon_usage;
pub mod customer;
pub mod invoice;
pub mod invoice_payment;
pub mod product;
pub mod sequence_counter;
pub mod service_visit;
pub mod vehicle;
pub mod warranty;
