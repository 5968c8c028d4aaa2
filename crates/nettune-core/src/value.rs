//! Sysctl value rendering and comparison
//!
//! Profile values arrive from JSON as numbers or strings. The kernel hands
//! values back as strings, with tab separators inside tuple values such as
//! `net.ipv4.tcp_rmem`. Rendering must never produce scientific notation,
//! and comparison must be whitespace-insensitive.

use serde::{Deserialize, Serialize};

/// A sysctl (or qdisc parameter) value as it appears in a profile.
///
/// Deserialises untagged: JSON integers become `Int`, other numbers `Float`,
/// strings `Str`. Whitespace-separated tuples are plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SysctlValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl SysctlValue {
    /// Render the value the way it must appear on a `sysctl -w` command line
    /// or in a sysctl.d file. Large numbers render as plain integers, never
    /// `3.3554432e7`.
    pub fn render(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.2e18 {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            Self::Str(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for SysctlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for SysctlValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<i64> for SysctlValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Normalise a sysctl value for comparison: tabs become spaces, runs of
/// whitespace collapse to one space, leading/trailing whitespace is trimmed.
/// The kernel reports tuple values tab-separated while profiles usually use
/// single spaces; both sides go through this before any equality check.
pub fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_integers_render_without_exponent() {
        let v = SysctlValue::Float(33554432.0);
        assert_eq!(v.render(), "33554432");
        assert!(!v.render().contains('e'));

        let v = SysctlValue::Int(16777216);
        assert_eq!(v.render(), "16777216");
    }

    #[test]
    fn integer_roundtrip_has_no_exponent() {
        for n in [0i64, 1, 212992, 33554432, 1 << 40, (1 << 62) + 7] {
            let rendered = SysctlValue::Int(n).render();
            assert!(!rendered.contains('e'), "{rendered}");
            assert_eq!(rendered.parse::<i64>().ok(), Some(n));
        }
    }

    #[test]
    fn fractional_floats_keep_their_fraction() {
        assert_eq!(SysctlValue::Float(0.5).render(), "0.5");
    }

    #[test]
    fn tuples_pass_through_verbatim() {
        let v = SysctlValue::from("4096 131072 16777216");
        assert_eq!(v.render(), "4096 131072 16777216");
    }

    #[test]
    fn normalize_handles_kernel_tabs() {
        assert_eq!(normalize("4096\t131072\t16777216"), "4096 131072 16777216");
        assert_eq!(normalize("  4096   131072\t 16777216 "), "4096 131072 16777216");
        assert_eq!(normalize("bbr"), "bbr");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in ["a\tb", "  x  y  ", "4096\t87380\t 6291456", "plain"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn deserializes_untagged_from_json() {
        let v: SysctlValue = serde_json::from_str("33554432").unwrap();
        assert_eq!(v, SysctlValue::Int(33554432));
        let v: SysctlValue = serde_json::from_str("\"4096 131072 16777216\"").unwrap();
        assert_eq!(v.render(), "4096 131072 16777216");
    }
}
