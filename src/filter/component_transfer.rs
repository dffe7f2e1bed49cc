// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::{num_attr, num_list, ImageRefMut};
use crate::xmltree::Node;

/// A per-channel transfer function.
///
/// <https://www.w3.org/TR/SVG11/filters.html#transferFuncElements>
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum TransferFunction {
    /// Keeps the component as is.
    Identity,

    /// A linear interpolation over a value table.
    ///
    /// The number list can be empty.
    Table(Vec<f64>),

    /// A step function over a value table.
    ///
    /// The number list can be empty.
    Discrete(Vec<f64>),

    /// A linear shift.
    Linear { slope: f64, intercept: f64 },

    /// An exponential shift.
    Gamma {
        amplitude: f64,
        exponent: f64,
        offset: f64,
    },
}

impl TransferFunction {
    /// Parses a `feFuncX` element.
    pub fn from_node(node: Node) -> Self {
        match node.attribute("type") {
            Some("table") => {
                TransferFunction::Table(num_list(node.attribute("tableValues").unwrap_or("")))
            }
            Some("discrete") => {
                TransferFunction::Discrete(num_list(node.attribute("tableValues").unwrap_or("")))
            }
            Some("linear") => TransferFunction::Linear {
                slope: num_attr(node, "slope").unwrap_or(1.0),
                intercept: num_attr(node, "intercept").unwrap_or(0.0),
            },
            Some("gamma") => TransferFunction::Gamma {
                amplitude: num_attr(node, "amplitude").unwrap_or(1.0),
                exponent: num_attr(node, "exponent").unwrap_or(1.0),
                offset: num_attr(node, "offset").unwrap_or(0.0),
            },
            _ => TransferFunction::Identity,
        }
    }

    /// Bakes the function into a byte lookup table.
    ///
    /// `None` when the function cannot change anything,
    /// so the channel can be skipped entirely.
    fn lookup_table(&self) -> Option<[u8; 256]> {
        match self {
            TransferFunction::Identity => return None,
            TransferFunction::Table(values) | TransferFunction::Discrete(values)
                if values.is_empty() =>
            {
                return None
            }
            _ => {}
        }

        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mapped = self.eval(i as f64 / 255.0);
            *slot = (mapped.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        }
        Some(table)
    }

    fn eval(&self, c: f64) -> f64 {
        match self {
            TransferFunction::Identity => c,
            TransferFunction::Table(values) => {
                // C' = v_k + (C * n - k) * (v_{k+1} - v_k), where n = len - 1.
                let n = values.len() - 1;
                if n == 0 {
                    return values[0];
                }
                let scaled = c * n as f64;
                let k = (scaled as usize).min(n - 1);
                values[k] + (scaled - k as f64) * (values[k + 1] - values[k])
            }
            TransferFunction::Discrete(values) => {
                let k = (c * values.len() as f64) as usize;
                values[k.min(values.len() - 1)]
            }
            TransferFunction::Linear { slope, intercept } => slope * c + intercept,
            TransferFunction::Gamma {
                amplitude,
                exponent,
                offset,
            } => amplitude * c.powf(*exponent) + offset,
        }
    }
}

/// Applies the transfer functions to each image channel.
///
/// Input image pixels should have an **unpremultiplied alpha**.
pub fn apply(
    func_r: &TransferFunction,
    func_g: &TransferFunction,
    func_b: &TransferFunction,
    func_a: &TransferFunction,
    image: ImageRefMut,
) {
    let table_r = func_r.lookup_table();
    let table_g = func_g.lookup_table();
    let table_b = func_b.lookup_table();
    let table_a = func_a.lookup_table();

    for pixel in image.data.iter_mut() {
        if let Some(ref table) = table_r {
            pixel.r = table[pixel.r as usize];
        }
        if let Some(ref table) = table_g {
            pixel.g = table[pixel.g as usize];
        }
        if let Some(ref table) = table_b {
            pixel.b = table[pixel.b as usize];
        }
        if let Some(ref table) = table_a {
            pixel.a = table[pixel.a as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_interpolates() {
        // An inverting ramp.
        let func = TransferFunction::Table(vec![1.0, 0.0]);
        let table = func.lookup_table().unwrap();
        assert_eq!(table[0], 255);
        assert_eq!(table[255], 0);
        assert!(table[128].abs_diff(127) <= 1);
    }

    #[test]
    fn discrete_steps() {
        let func = TransferFunction::Discrete(vec![0.0, 1.0]);
        let table = func.lookup_table().unwrap();
        assert_eq!(table[0], 0);
        assert_eq!(table[127], 0);
        assert_eq!(table[128], 255);
        assert_eq!(table[255], 255);
    }

    #[test]
    fn dummy_functions_are_skipped() {
        assert!(TransferFunction::Identity.lookup_table().is_none());
        assert!(TransferFunction::Table(Vec::new()).lookup_table().is_none());
        assert!(TransferFunction::Discrete(Vec::new()).lookup_table().is_none());
    }

    #[test]
    fn linear_clamps() {
        let func = TransferFunction::Linear {
            slope: 2.0,
            intercept: 0.0,
        };
        let table = func.lookup_table().unwrap();
        assert_eq!(table[64], 128);
        assert_eq!(table[200], 255);
    }
}
