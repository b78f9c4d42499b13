use std::io::Write;

use crate::{datatypes::ShapePoint, error::ShellError, solver::LoadPath};

fn create(output: &str) -> Result<std::fs::File, ShellError> {
    match std::fs::File::create(output) {
        Ok(f) => Ok(f),
        Err(err) => Err(ShellError::PostProcessor(format!(
            "Failed to create {output}: {err}"
        ))),
    }
}

fn write_line(file: &mut std::fs::File, output: &str, line: String) -> Result<(), ShellError> {
    match file.write_all(line.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) => Err(ShellError::PostProcessor(format!(
            "Failed to write {output}: {err}"
        ))),
    }
}

/// Writes the parent and deformed shapes to a CSV file
///
/// # Arguments
/// * `shape` - Paired parent/child points
/// * `output` - The filename of the output csv
pub fn csv_output(shape: &[ShapePoint], output: &str) -> Result<(), ShellError> {
    let mut file = create(output)?;

    write_line(&mut file, output, "x_parent,z_parent,x_child,z_child\n".to_owned())?;
    for point in shape {
        write_line(
            &mut file,
            output,
            format!(
                "{xp},{zp},{xc},{zc}\n",
                xp = point.parent.x,
                zp = point.parent.y,
                xc = point.child.x,
                zc = point.child.y,
            ),
        )?;
    }

    println!("info: wrote output to {}", output);

    Ok(())
}

/// Writes one row per load step: the load factor, the residual and the
/// displacement of every load point
pub fn load_path_output(path: &LoadPath, output: &str) -> Result<(), ShellError> {
    let mut file = create(output)?;

    let n_loads = path
        .steps
        .first()
        .map(|s| s.solution.evaluation.displacements.len())
        .unwrap_or(0);
    let mut header = "factor,residual".to_owned();
    for i in 0..n_loads {
        header.push_str(&format!(",ux{i},uz{i}"));
    }
    header.push('\n');
    write_line(&mut file, output, header)?;

    for step in &path.steps {
        let mut row = format!("{},{}", step.factor, step.solution.residual);
        for u in &step.solution.evaluation.displacements {
            row.push_str(&format!(",{},{}", u.x, u.y));
        }
        row.push('\n');
        write_line(&mut file, output, row)?;
    }

    println!("info: wrote load path to {}", output);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    fn temp_file(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("shellsolve-{}-{name}", std::process::id()))
            .into_os_string()
            .into_string()
            .unwrap()
    }

    #[test]
    fn shape_csv_has_header_and_rows() {
        let shape = vec![
            ShapePoint {
                parent: Vector2::new(0.0, 0.0),
                child: Vector2::new(0.0, 0.0),
            },
            ShapePoint {
                parent: Vector2::new(1.0, 0.0),
                child: Vector2::new(0.5, -0.25),
            },
        ];
        let output = temp_file("shape.csv");
        csv_output(&shape, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        std::fs::remove_file(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x_parent,z_parent,x_child,z_child");
        assert_eq!(lines[2], "1,0,0.5,-0.25");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_load_path_writes_header_only() {
        let output = temp_file("path.csv");
        load_path_output(&LoadPath { steps: Vec::new() }, &output).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        std::fs::remove_file(&output).unwrap();
        assert_eq!(text, "factor,residual\n");
    }

    #[test]
    fn unwritable_path_is_a_post_processor_error() {
        assert!(matches!(
            csv_output(&[], "/nonexistent/dir/shape.csv"),
            Err(ShellError::PostProcessor(_))
        ));
    }
}
