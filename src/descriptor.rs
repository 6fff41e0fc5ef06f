//! Static descriptor registry (§4.10), grounded on
//! `original_source/include/libdivecomputer/descriptor.h`.
//!
//! The original exposes a restartable iterator over a process-global
//! table; here that's just a `&'static [Descriptor]` slice plus a couple
//! of query helpers, since Rust iterators are already restartable by
//! re-calling `.iter()`.

use crate::transport::TransportKindMask;

/// One family implementation per product line (§3 "Family"). Distinct
/// from [`crate::device::Family`] only in name — kept as a separate type
/// so the registry reads as data, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    SuuntoVyper,
    SuuntoVyper2,
    SuuntoD9,
    ReefnetSensus,
    ReefnetSensusPro,
    ReefnetSensusUltra,
    MaresNemo,
    MaresDarwin,
    MaresDarwinAir,
    HwOstc,
    HwFrog,
    ShearwaterPredator,
    ShearwaterPetrel,
}

#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub vendor: &'static str,
    pub product: &'static str,
    pub family: Family,
    pub model: u32,
    pub transports: TransportKindMask,
}

macro_rules! serial_only {
    () => {
        TransportKindMask::SERIAL
    };
}

/// The process-global descriptor table (§5 "only global state ... the
/// static descriptor registry").
pub static DESCRIPTORS: &[Descriptor] = &[
    Descriptor {
        vendor: "Suunto",
        product: "Vyper",
        family: Family::SuuntoVyper,
        model: 0x01,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Suunto",
        product: "Vyper 2",
        family: Family::SuuntoVyper2,
        model: 0x03,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Suunto",
        product: "D9",
        family: Family::SuuntoD9,
        model: 0x0E,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus",
        family: Family::ReefnetSensus,
        model: 1,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus Pro",
        family: Family::ReefnetSensusPro,
        model: 2,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Reefnet",
        product: "Sensus Ultra",
        family: Family::ReefnetSensusUltra,
        model: 3,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Mares",
        product: "Nemo",
        family: Family::MaresNemo,
        model: 0,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Mares",
        product: "Darwin",
        family: Family::MaresDarwin,
        model: 1,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Mares",
        product: "Darwin Air",
        family: Family::MaresDarwinAir,
        model: 2,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Heinrichs Weikamp",
        product: "OSTC",
        family: Family::HwOstc,
        model: 0,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Heinrichs Weikamp",
        product: "Frog",
        family: Family::HwFrog,
        model: 0,
        transports: serial_only!(),
    },
    Descriptor {
        vendor: "Shearwater",
        product: "Predator",
        family: Family::ShearwaterPredator,
        model: 0,
        transports: TransportKindMask::SERIAL.union(TransportKindMask::BLUETOOTH),
    },
    Descriptor {
        vendor: "Shearwater",
        product: "Petrel",
        family: Family::ShearwaterPetrel,
        model: 1,
        transports: TransportKindMask::SERIAL
            .union(TransportKindMask::BLUETOOTH)
            .union(TransportKindMask::BLE),
    },
];

pub fn iter() -> impl Iterator<Item = &'static Descriptor> {
    DESCRIPTORS.iter()
}

pub fn filter_by_transport(kind: TransportKindMask) -> impl Iterator<Item = &'static Descriptor> {
    DESCRIPTORS
        .iter()
        .filter(move |d| d.transports.intersects(kind))
}

pub fn by_family(family: Family) -> Option<&'static Descriptor> {
    DESCRIPTORS.iter().find(|d| d.family == family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_non_empty_and_restartable() {
        let first_pass: Vec<_> = iter().map(|d| d.product).collect();
        let second_pass: Vec<_> = iter().map(|d| d.product).collect();
        assert!(!first_pass.is_empty());
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn filter_by_transport_excludes_non_matching() {
        let ble: Vec<_> = filter_by_transport(TransportKindMask::BLE).collect();
        assert!(ble.iter().all(|d| d.transports.contains(TransportKindMask::BLE)));
        assert!(ble.iter().any(|d| d.family == Family::ShearwaterPetrel));
    }
}
