//! Concise record-literal macros for tests, ported from the teacher's
//! `macros.rs` and extended to the record types this tracer follows
//! (CNAME, MX, SRV, TXT).

#[macro_export]
macro_rules! ns {
    ($name:expr, $target:expr) => {
        hickory_proto::rr::Record::from_rdata(
            $name.parse().unwrap(),
            0,
            hickory_proto::rr::RData::NS(hickory_proto::rr::rdata::NS($target.parse().unwrap())),
        )
    };
}

#[macro_export]
macro_rules! a {
    ($name:expr, $target:expr) => {
        hickory_proto::rr::Record::from_rdata(
            $name.parse().unwrap(),
            0,
            hickory_proto::rr::RData::A(hickory_proto::rr::rdata::A($target.parse().unwrap())),
        )
    };
}

#[macro_export]
macro_rules! cname {
    ($name:expr, $target:expr) => {
        hickory_proto::rr::Record::from_rdata(
            $name.parse().unwrap(),
            0,
            hickory_proto::rr::RData::CNAME(hickory_proto::rr::rdata::CNAME($target.parse().unwrap())),
        )
    };
}

#[macro_export]
macro_rules! mx {
    ($name:expr, $pref:expr, $exchange:expr) => {
        hickory_proto::rr::Record::from_rdata(
            $name.parse().unwrap(),
            0,
            hickory_proto::rr::RData::MX(hickory_proto::rr::rdata::MX::new($pref, $exchange.parse().unwrap())),
        )
    };
}
