// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tagged textual dumps for debugging. Not a stable format.
//!
//! ```text
//! <matrix rows="2" columns="2">
//!   <row>1|2</row>
//!   <row>3|4</row>
//! </matrix>
//! ```

use crate::shape::{Matrix, Tensor, Tensor3D, Tensor4D, Vector};
use std::fmt::Write;

/// Renders a tensor as nested tags with `|`-delimited rows.
pub trait DebugDump {
    fn write_dump(&self, out: &mut String, indent: usize);

    fn dump(&self) -> String {
        let mut out = String::new();
        self.write_dump(&mut out, 0);
        out
    }
}

fn join(values: &[f32]) -> String {
    values
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent * 2));
}

fn write_rows(out: &mut String, values: &[f32], columns: usize, indent: usize) {
    for row in values.chunks(columns.max(1)) {
        pad(out, indent);
        let _ = writeln!(out, "<row>{}</row>", join(row));
    }
}

impl DebugDump for Vector {
    fn write_dump(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        let _ = writeln!(
            out,
            "<vector size=\"{}\">{}</vector>",
            self.len(),
            join(&self.to_vec())
        );
    }
}

impl DebugDump for Matrix {
    fn write_dump(&self, out: &mut String, indent: usize) {
        pad(out, indent);
        let _ = writeln!(
            out,
            "<matrix rows=\"{}\" columns=\"{}\">",
            self.rows(),
            self.columns()
        );
        write_rows(out, &self.to_vec(), self.columns(), indent + 1);
        pad(out, indent);
        out.push_str("</matrix>\n");
    }
}

fn write_slices(out: &mut String, values: &[f32], [depth, rows, columns]: [usize; 3], indent: usize) {
    let plane = rows * columns;
    for d in 0..depth {
        pad(out, indent);
        let _ = writeln!(out, "<matrix depth=\"{d}\" rows=\"{rows}\" columns=\"{columns}\">");
        write_rows(out, &values[d * plane..(d + 1) * plane], columns, indent + 1);
        pad(out, indent);
        out.push_str("</matrix>\n");
    }
}

impl DebugDump for Tensor3D {
    fn write_dump(&self, out: &mut String, indent: usize) {
        let dims = self.dims();
        pad(out, indent);
        let _ = writeln!(
            out,
            "<tensor3d depth=\"{}\" rows=\"{}\" columns=\"{}\">",
            dims[0], dims[1], dims[2]
        );
        write_slices(out, &self.to_vec(), dims, indent + 1);
        pad(out, indent);
        out.push_str("</tensor3d>\n");
    }
}

impl DebugDump for Tensor4D {
    fn write_dump(&self, out: &mut String, indent: usize) {
        let [count, depth, rows, columns] = self.dims();
        let values = self.to_vec();
        let volume = depth * rows * columns;
        pad(out, indent);
        let _ = writeln!(
            out,
            "<tensor4d count=\"{count}\" depth=\"{depth}\" rows=\"{rows}\" columns=\"{columns}\">"
        );
        for n in 0..count {
            pad(out, indent + 1);
            let _ = writeln!(out, "<tensor3d index=\"{n}\">");
            write_slices(
                out,
                &values[n * volume..(n + 1) * volume],
                [depth, rows, columns],
                indent + 2,
            );
            pad(out, indent + 1);
            out.push_str("</tensor3d>\n");
        }
        pad(out, indent);
        out.push_str("</tensor4d>\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComputeUnit;

    #[test]
    fn test_vector_dump() {
        let u = ComputeUnit::with_defaults().unwrap();
        let v = u.create_vector_from(3, &[1.0, 2.5, -3.0]).unwrap();
        assert_eq!(v.dump(), "<vector size=\"3\">1|2.5|-3</vector>\n");
    }

    #[test]
    fn test_matrix_dump() {
        let u = ComputeUnit::with_defaults().unwrap();
        let m = u.create_matrix_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(
            m.dump(),
            "<matrix rows=\"2\" columns=\"2\">\n  <row>1|2</row>\n  <row>3|4</row>\n</matrix>\n"
        );
    }

    #[test]
    fn test_nested_dumps() {
        let u = ComputeUnit::with_defaults().unwrap();
        let q = u.create_tensor4d_with(2, 1, 1, 2, |n, _, _, c| (n * 10 + c) as f32).unwrap();
        let text = q.dump();
        assert!(text.starts_with("<tensor4d count=\"2\""));
        assert!(text.contains("<tensor3d index=\"1\">"));
        assert!(text.contains("<row>10|11</row>"));
        assert_eq!(text.matches("<matrix").count(), 2);

        let t = q.tensor(0).unwrap();
        assert!(t.dump().contains("<row>0|1</row>"));
    }
}
