use std::fmt::{self, Debug, Display};

use faer::prelude::*;

use crate::{ErrorGradient, Layer, LayerKind};

/// Renders a layer as `a_u = φ([W] a_{u-1} + [b])`, one matrix row per line.
pub struct PrettyPrintLayer<'a> {
    i_layer: usize,
    layer: &'a Layer,
}

impl<'a> PrettyPrintLayer<'a> {
    pub fn new(i_layer: usize, layer: &'a Layer) -> Self {
        Self { i_layer, layer }
    }
}

impl Debug for PrettyPrintLayer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for PrettyPrintLayer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.layer.kind() == LayerKind::Input {
            return write!(f, "x ({} inputs)", self.layer.n());
        }
        let phi = self.layer.phi().to_string();
        write_equation(f, self.i_layer, &phi, self.layer.w(), self.layer.b(), 4)
    }
}

/// Renders a gradient as `dW_u = [dW], db_u = [db]`, one row per line, with more digits than
/// [`PrettyPrintLayer`].
pub struct PrettyPrintGradient<'a> {
    i_layer: usize,
    gradient: &'a ErrorGradient,
}

impl<'a> PrettyPrintGradient<'a> {
    pub fn new(i_layer: usize, gradient: &'a ErrorGradient) -> Self {
        Self { i_layer, gradient }
    }
}

impl Debug for PrettyPrintGradient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for PrettyPrintGradient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (dw, db) = (self.gradient.dw.as_ref(), self.gradient.db.as_ref());
        let i_layer = self.i_layer;
        let center_line = dw.nrows() / 2;
        let label_length = n_digits(i_layer) + 6; // "dW_u = "
        for i_line in 0..dw.nrows() {
            if i_line == center_line {
                write!(f, "dW_{i_layer} = [")?;
            } else {
                write!(f, "{:width$}[", "", width = label_length)?;
            }
            for j in 0..dw.ncols() {
                write_element(f, dw[(i_line, j)], 12)?;
                if j + 1 != dw.ncols() {
                    write!(f, " ")?;
                }
            }
            if i_line == center_line {
                write!(f, "], db_{i_layer} = [")?;
            } else {
                write!(f, "]{:width$}[", "", width = label_length + 2)?;
            }
            write_element(f, db[i_line], 12)?;
            write!(f, "]")?;
            if i_line + 1 != dw.nrows() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

fn n_digits(u: usize) -> usize {
    match u {
        0 => 1,
        u => ((u as f32).log10() + 1.0) as usize,
    }
}

fn write_element(f: &mut fmt::Formatter, element: f32, precision: usize) -> fmt::Result {
    if element.is_sign_positive() {
        write!(f, " {element:.precision$}")
    } else {
        write!(f, "{element:.precision$}")
    }
}

fn write_equation(
    f: &mut fmt::Formatter,
    i_layer: usize,
    phi: &str,
    w: MatRef<f32>,
    b: ColRef<f32>,
    precision: usize,
) -> fmt::Result {
    let n = w.nrows();
    let center_line = n / 2;
    let i_layer_length = n_digits(i_layer);
    let i_previous_layer_length = match i_layer.checked_sub(1) {
        None | Some(0) => 1, // "x"
        Some(i_previous) => n_digits(i_previous) + 2,
    };
    for i_line in 0..n {
        if i_line == center_line {
            write!(f, "a_{i_layer} = {phi}(")?;
        } else {
            for _ in 0..(6 + phi.len() + i_layer_length) {
                write!(f, " ")?;
            }
        }
        write!(f, "[")?;
        for j in 0..w.ncols() {
            write_element(f, w[(i_line, j)], precision)?;
            if j + 1 != w.ncols() {
                write!(f, " ")?;
            }
        }
        write!(f, "]")?;
        if i_line == center_line {
            match i_layer.checked_sub(1) {
                None | Some(0) => write!(f, " x + ")?,
                Some(i_previous) => write!(f, " a_{i_previous} + ")?,
            }
        } else {
            for _ in 0..(i_previous_layer_length + 4) {
                write!(f, " ")?;
            }
        }
        write!(f, "[")?;
        write_element(f, b[i_line], precision)?;
        write!(f, "]")?;
        if i_line == center_line {
            write!(f, ")")?;
        }
        if i_line + 1 != n {
            writeln!(f)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransferFunction;

    #[test]
    fn prints_one_line_per_neuron() {
        let w = Mat::from_fn(3, 2, |i, j| (i as f32) - (j as f32) * 0.5);
        let b = Col::from_fn(3, |k| k as f32 * -0.25);
        let layer = Layer::from_parts(LayerKind::Output, w, b, TransferFunction::Tanh).unwrap();
        let printed = layer.pretty_print(2).to_string();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("a_2 = tanh(["));
        assert!(lines[1].contains(" a_1 + "));
        assert!(lines[1].ends_with(')'));
        assert!(lines[0].contains("0.0000"));
        assert!(lines[2].contains("-0.5000"));
    }

    #[test]
    fn first_hidden_layer_reads_from_x() {
        let layer = Layer::new(LayerKind::Hidden, 1, 2, TransferFunction::Sigmoid).unwrap();
        assert_eq!(
            layer.pretty_print(1).to_string(),
            "a_1 = sigmoid([ 0.0000  0.0000] x + [ 0.0000])"
        );
        assert_eq!(Layer::input(2).pretty_print(0).to_string(), "x (2 inputs)");
    }

    #[test]
    fn gradient_is_labelled_as_weight_and_bias_derivatives() {
        let gradient = ErrorGradient::zeros(1, 1);
        let printed = PrettyPrintGradient::new(1, &gradient).to_string();
        assert_eq!(printed, "dW_1 = [ 0.000000000000], db_1 = [ 0.000000000000]");

        let mut gradient = ErrorGradient::zeros(3, 2);
        gradient.dw[(0, 1)] = -0.5;
        gradient.db[2] = 0.25;
        let printed = PrettyPrintGradient::new(12, &gradient).to_string();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("dW_12 = ["));
        assert!(lines[1].contains("], db_12 = ["));
        assert!(!printed.contains("a_12"));
        assert!(lines[0].contains("-0.500000000000"));
        assert!(lines[2].ends_with("[ 0.250000000000]"));
        // Columns line up under the centre line.
        assert_eq!(lines[0].find('['), lines[1].find('['));
        assert_eq!(lines[0].rfind('['), lines[1].rfind('['));
    }
}
