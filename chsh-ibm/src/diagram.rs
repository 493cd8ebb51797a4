//! Circuit diagrams as images
//!
//! Only wires touched by a gate are drawn, so an ISA circuit on a
//! 127-qubit device shows just its two physical qubits. Gates are placed
//! in ASAP layers, one column per layer.

use crate::circuit::{Circuit, Gate, GateType};
use crate::error::{ChshError, Result};
use crate::plot::ensure_parent_dir;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::Path;
use tracing::info;

const WIRE_SPACING: i32 = 70;
const LABEL_MARGIN: i32 = 80;
const MIN_COLUMN: i32 = 64;
const BOX_HEIGHT: i32 = 40;
const PADDING: i32 = 30;

const HADAMARD: RGBColor = RGBColor(250, 77, 86);
const PAULI: RGBColor = RGBColor(0, 45, 156);
const ROTATION: RGBColor = RGBColor(159, 24, 83);
const CONTROL: RGBColor = RGBColor(0, 45, 156);
const WIRE: RGBColor = RGBColor(60, 60, 60);

/// Geometry of a diagram, in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramLayout {
    /// Drawn qubits, top to bottom
    pub wires: Vec<usize>,

    /// Gate indices per column
    pub columns: Vec<Vec<usize>>,

    /// Column widths
    pub column_widths: Vec<i32>,

    /// Image size
    pub size: (u32, u32),
}

impl DiagramLayout {
    /// Lay out the active wires and ASAP columns of a circuit
    pub fn of(circuit: &Circuit) -> Self {
        let wires = circuit.active_qubits();
        let columns = circuit.layers();
        let column_widths: Vec<i32> = columns
            .iter()
            .map(|col| {
                col.iter()
                    .map(|&idx| gate_width(&circuit.gates[idx], &circuit.param_names))
                    .max()
                    .unwrap_or(MIN_COLUMN)
            })
            .collect();

        let width = LABEL_MARGIN + column_widths.iter().sum::<i32>() + 2 * PADDING;
        let height = (wires.len().max(1) as i32 - 1) * WIRE_SPACING + 2 * PADDING + BOX_HEIGHT;

        Self {
            wires,
            columns,
            column_widths,
            size: (width as u32, height as u32),
        }
    }

    /// Vertical centre of a qubit's wire
    pub fn wire_y(&self, qubit: usize) -> Option<i32> {
        self.wires
            .iter()
            .position(|&w| w == qubit)
            .map(|row| PADDING + BOX_HEIGHT / 2 + row as i32 * WIRE_SPACING)
    }

    /// Horizontal centre of a column
    pub fn column_x(&self, column: usize) -> i32 {
        let before: i32 = self.column_widths[..column].iter().sum();
        LABEL_MARGIN + PADDING + before + self.column_widths[column] / 2
    }
}

fn gate_width(gate: &Gate, param_names: &[String]) -> i32 {
    match gate.gate_type {
        GateType::CX | GateType::CZ => MIN_COLUMN,
        _ => (gate.label(param_names).chars().count() as i32 * 9 + 28).max(MIN_COLUMN),
    }
}

/// Image rendering of a circuit
pub struct CircuitDiagram<'a> {
    circuit: &'a Circuit,
    layout: DiagramLayout,
}

impl<'a> CircuitDiagram<'a> {
    pub fn new(circuit: &'a Circuit) -> Self {
        Self {
            circuit,
            layout: DiagramLayout::of(circuit),
        }
    }

    pub fn layout(&self) -> &DiagramLayout {
        &self.layout
    }

    /// Write the diagram; `.svg` paths produce SVG, anything else PNG
    pub fn render(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;

        let size = self.layout.size;
        let is_svg = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("svg"));

        if is_svg {
            self.draw(SVGBackend::new(path, size).into_drawing_area())?;
        } else {
            self.draw(BitMapBackend::new(path, size).into_drawing_area())?;
        }

        info!(
            path = %path.display(),
            wires = self.layout.wires.len(),
            columns = self.layout.columns.len(),
            "circuit diagram written"
        );
        Ok(())
    }

    fn draw<DB: DrawingBackend>(&self, root: DrawingArea<DB, Shift>) -> Result<()> {
        root.fill(&WHITE).map_err(ChshError::plot)?;

        let centered = Pos::new(HPos::Center, VPos::Center);
        let label_font = ("sans-serif", 16).into_font().color(&BLACK);
        let right = label_font.pos(Pos::new(HPos::Right, VPos::Center));
        let right_edge = self.layout.size.0 as i32 - PADDING;

        for &q in &self.layout.wires {
            let Some(y) = self.layout.wire_y(q) else {
                continue;
            };
            root.draw(&PathElement::new(
                vec![(LABEL_MARGIN, y), (right_edge, y)],
                WIRE.stroke_width(1),
            ))
            .map_err(ChshError::plot)?;
            root.draw(&Text::new(self.circuit.wire_name(q), (LABEL_MARGIN - 10, y), right.clone()))
                .map_err(ChshError::plot)?;
        }

        for (column, gates) in self.layout.columns.iter().enumerate() {
            let x = self.layout.column_x(column);
            let width = self.layout.column_widths[column] - 12;
            for &idx in gates {
                self.draw_gate(&root, &self.circuit.gates[idx], x, width, centered)?;
            }
        }

        root.present().map_err(ChshError::plot)?;
        Ok(())
    }

    fn draw_gate<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, Shift>,
        gate: &Gate,
        x: i32,
        width: i32,
        centered: Pos,
    ) -> Result<()> {
        let text = ("sans-serif", 15).into_font().color(&WHITE).pos(centered);
        let ys: Vec<i32> = gate
            .qubits
            .iter()
            .filter_map(|&q| self.layout.wire_y(q))
            .collect();

        match (&gate.gate_type, ys.as_slice()) {
            (GateType::CX, &[yc, yt]) => {
                root.draw(&PathElement::new(vec![(x, yc), (x, yt)], CONTROL.stroke_width(2)))
                    .map_err(ChshError::plot)?;
                root.draw(&Circle::new((x, yc), 6, CONTROL.filled()))
                    .map_err(ChshError::plot)?;
                root.draw(&Circle::new((x, yt), 14, CONTROL.filled()))
                    .map_err(ChshError::plot)?;
                root.draw(&PathElement::new(vec![(x - 8, yt), (x + 8, yt)], WHITE.stroke_width(2)))
                    .map_err(ChshError::plot)?;
                root.draw(&PathElement::new(vec![(x, yt - 8), (x, yt + 8)], WHITE.stroke_width(2)))
                    .map_err(ChshError::plot)?;
            }
            (GateType::CZ, &[ya, yb]) => {
                root.draw(&PathElement::new(vec![(x, ya), (x, yb)], CONTROL.stroke_width(2)))
                    .map_err(ChshError::plot)?;
                for y in [ya, yb] {
                    root.draw(&Circle::new((x, y), 6, CONTROL.filled()))
                        .map_err(ChshError::plot)?;
                }
            }
            (GateType::ECR, &[ya, yb]) => {
                let (top, bottom) = (ya.min(yb), ya.max(yb));
                root.draw(&Rectangle::new(
                    [
                        (x - width / 2, top - BOX_HEIGHT / 2),
                        (x + width / 2, bottom + BOX_HEIGHT / 2),
                    ],
                    PAULI.filled(),
                ))
                .map_err(ChshError::plot)?;
                root.draw(&Text::new("ECR", (x, (top + bottom) / 2), text))
                    .map_err(ChshError::plot)?;
            }
            (gate_type, &[y]) => {
                let fill = match gate_type {
                    GateType::H => HADAMARD,
                    GateType::Ry(_) | GateType::Rz(_) => ROTATION,
                    _ => PAULI,
                };
                root.draw(&Rectangle::new(
                    [
                        (x - width / 2, y - BOX_HEIGHT / 2),
                        (x + width / 2, y + BOX_HEIGHT / 2),
                    ],
                    fill.filled(),
                ))
                .map_err(ChshError::plot)?;
                root.draw(&Text::new(gate.label(&self.circuit.param_names), (x, y), text))
                    .map_err(ChshError::plot)?;
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{chsh_circuit, Angle};
    use crate::plot::fonts_available;

    #[test]
    fn test_layout_of_chsh_circuit() {
        let circuit = chsh_circuit();
        let layout = DiagramLayout::of(&circuit);

        assert_eq!(layout.wires, vec![0, 1]);
        assert_eq!(layout.columns.len(), 3);
        assert!(layout.wire_y(0).unwrap() < layout.wire_y(1).unwrap());
        assert_eq!(layout.wire_y(2), None);
        assert!(layout.column_x(0) < layout.column_x(1));
        assert!(layout.column_x(1) < layout.column_x(2));
    }

    #[test]
    fn test_idle_wires_hidden() {
        let mut circuit = Circuit::physical(127, vec!["theta".into()]);
        circuit.sx(40).rz(Angle::param(0), 40).cz(40, 41);

        let layout = DiagramLayout::of(&circuit);
        assert_eq!(layout.wires, vec![40, 41]);
        assert_eq!(
            layout.size.1 as i32,
            WIRE_SPACING + 2 * PADDING + BOX_HEIGHT
        );
    }

    #[test]
    fn test_wide_labels_widen_columns() {
        let mut circuit = Circuit::new(1);
        let theta = circuit.parameter("theta");
        circuit.x(0).ry(theta.shifted(-1.25), 0);

        let layout = DiagramLayout::of(&circuit);
        assert_eq!(layout.column_widths[0], MIN_COLUMN);
        assert!(layout.column_widths[1] > MIN_COLUMN);
    }

    #[test]
    fn test_render_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("bell_inequality.png");
        let circuit = chsh_circuit();
        let err = CircuitDiagram::new(&circuit).render(&path).unwrap_err();
        assert!(matches!(err, ChshError::IoError(_)));
    }

    #[test]
    fn test_render_png() {
        if !fonts_available() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bell_inequality.png");
        let circuit = chsh_circuit();
        CircuitDiagram::new(&circuit).render(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
