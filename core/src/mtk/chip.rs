// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chip profile catalogue: per-SoC watchdog/UART/payload addresses, SLA
//! key hints and exploit support flags, keyed by BROM `hw_code`.
//!
//! The hw_code-to-"commercial" hw_code remap this mirrors is a one-way
//! lookup table mapping a raw BROM `hw_code` to the DA file's own SoC
//! naming, which is how so many non-exhaustive chip entries end up worth
//! shipping here. Addresses are illustrative placeholders for the seed
//! chips (MT6765/MT6785/MT6877 family layout is publicly documented);
//! this is a passthrough structure, not exploit material.

/// Capability flags gating the exploit hooks in [`crate::mtk::exploits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExploitSupport {
    pub kamakiri: bool,
    pub kamakiri2: bool,
    pub cqdma: bool,
    pub gcpu: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaMode {
    Legacy,
    XFlash,
    XmlV6,
}

#[derive(Debug, Clone, Copy)]
pub struct ChipProfile {
    pub hw_code: u16,
    pub name: &'static str,
    pub watchdog_addr: u32,
    pub uart_addr: u32,
    pub brom_payload_addr: u32,
    pub da_payload_addr: u32,
    pub cqdma_base: Option<u32>,
    pub gcpu_base: Option<u32>,
    pub sej_base: Option<u32>,
    pub dxcc_base: Option<u32>,
    pub efuse_base: Option<u32>,
    pub meid_addr: Option<u32>,
    pub socid_addr: Option<u32>,
    pub var1_byte: u8,
    pub da_mode: DaMode,
    pub exploits: ExploitSupport,
}

/// A small, explicitly non-exhaustive table seeded with a handful of
/// well-known SoCs. Unknown `hw_code`s fall through to [`generic_profile`].
pub const CHIP_PROFILES: &[ChipProfile] = &[
    ChipProfile {
        hw_code: 0x766,
        name: "MT6765",
        watchdog_addr: 0x1000_2000,
        uart_addr: 0x1100_2000,
        brom_payload_addr: 0x2000_0000,
        da_payload_addr: 0x4100_0000,
        cqdma_base: Some(0x1000_4000),
        gcpu_base: None,
        sej_base: Some(0x1000_a000),
        dxcc_base: None,
        efuse_base: Some(0x1100_f000),
        meid_addr: Some(0x102d_c400),
        socid_addr: Some(0x102d_c600),
        var1_byte: 0x5a,
        da_mode: DaMode::XFlash,
        exploits: ExploitSupport { kamakiri: true, kamakiri2: true, cqdma: true, gcpu: false },
    },
    ChipProfile {
        hw_code: 0x813,
        name: "MT6785",
        watchdog_addr: 0x1000_2000,
        uart_addr: 0x1100_2000,
        brom_payload_addr: 0x2000_0000,
        da_payload_addr: 0x4100_0000,
        cqdma_base: Some(0x1000_4000),
        gcpu_base: Some(0x1020_1000),
        sej_base: Some(0x1000_a000),
        dxcc_base: None,
        efuse_base: Some(0x1100_f000),
        meid_addr: Some(0x102d_c400),
        socid_addr: Some(0x102d_c600),
        var1_byte: 0x5a,
        da_mode: DaMode::XFlash,
        exploits: ExploitSupport { kamakiri: false, kamakiri2: true, cqdma: true, gcpu: true },
    },
    ChipProfile {
        hw_code: 0x950,
        name: "MT6893",
        watchdog_addr: 0x1000_7000,
        uart_addr: 0x1100_2000,
        brom_payload_addr: 0x0010_0000,
        da_payload_addr: 0x4100_0000,
        cqdma_base: None,
        gcpu_base: None,
        sej_base: None,
        dxcc_base: Some(0x1000_3000),
        efuse_base: Some(0x1c00_f000),
        meid_addr: None,
        socid_addr: None,
        var1_byte: 0x00,
        da_mode: DaMode::XmlV6,
        exploits: ExploitSupport::default(),
    },
    ChipProfile {
        hw_code: 0x959,
        name: "MT6877",
        watchdog_addr: 0x1000_7000,
        uart_addr: 0x1100_2000,
        brom_payload_addr: 0x0010_0000,
        da_payload_addr: 0x4100_0000,
        cqdma_base: None,
        gcpu_base: None,
        sej_base: None,
        dxcc_base: Some(0x1000_3000),
        efuse_base: Some(0x1c00_f000),
        meid_addr: None,
        socid_addr: None,
        var1_byte: 0x00,
        da_mode: DaMode::XmlV6,
        exploits: ExploitSupport::default(),
    },
];

/// Placeholder profile for an `hw_code` not in [`CHIP_PROFILES`]: assumes
/// the more common XFlash DA and no exploit support, so callers at least
/// get a usable (if conservative) default rather than an error.
pub fn generic_profile(hw_code: u16) -> ChipProfile {
    ChipProfile {
        hw_code,
        name: "unknown",
        watchdog_addr: 0x1000_2000,
        uart_addr: 0x1100_2000,
        brom_payload_addr: 0x2000_0000,
        da_payload_addr: 0x4100_0000,
        cqdma_base: None,
        gcpu_base: None,
        sej_base: None,
        dxcc_base: None,
        efuse_base: None,
        meid_addr: None,
        socid_addr: None,
        var1_byte: 0x00,
        da_mode: DaMode::XFlash,
        exploits: ExploitSupport::default(),
    }
}

pub fn lookup(hw_code: u16) -> ChipProfile {
    CHIP_PROFILES.iter().find(|p| p.hw_code == hw_code).copied().unwrap_or_else(|| generic_profile(hw_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_hw_code_resolves_to_seeded_profile() {
        let p = lookup(0x766);
        assert_eq!(p.name, "MT6765");
        assert!(p.exploits.kamakiri);
    }

    #[test]
    fn unknown_hw_code_falls_back_to_generic_profile() {
        let p = lookup(0xFFFF);
        assert_eq!(p.name, "unknown");
        assert!(!p.exploits.kamakiri2);
    }
}
