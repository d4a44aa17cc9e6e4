use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::{
    Float,
    config::OutputConfig,
    fields::Fields,
    lattice::D3Q19,
    solver::SnapshotSink,
    topology::FlagField,
};

/// Writes VTK snapshots of the interior plus the verbose field dumps.
pub struct VTKWriter {
    output_directory: PathBuf,
    file_prefix: String,
    collection_entries: Vec<(usize, PathBuf)>, // (timestep, filename)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("cannot create output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

impl VTKWriter {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        let output_directory = PathBuf::from(&config.output_directory);
        std::fs::create_dir_all(&output_directory).with_context(|| {
            format!("cannot create output directory {}", output_directory.display())
        })?;

        Ok(Self {
            output_directory,
            file_prefix: config.file_prefix.clone(),
            collection_entries: Vec::new(),
        })
    }

    pub fn snapshot_path(&self, timestep: usize) -> PathBuf {
        self.output_directory
            .join(format!("{}_{:06}.vtk", self.file_prefix, timestep))
    }

    /// Write density and velocity of the interior nodes.
    pub fn write(&mut self, fields: &Fields, timestep: usize) -> Result<PathBuf> {
        let path = self.snapshot_path(timestep);
        let grid = fields.grid();
        let n = grid.xlength();

        // Interior nodes in VTK point order (x fastest).
        let interior: Vec<usize> = (1..=n)
            .flat_map(|z| (1..=n).flat_map(move |y| (1..=n).map(move |x| (x, y, z))))
            .map(|(x, y, z)| grid.index(x, y, z))
            .collect();
        let moments: Vec<_> = interior
            .iter()
            .map(|&node| D3Q19::moments(fields.distributions.node(node)))
            .collect();

        let mut file = create(&path)?;

        writeln!(file, "# vtk DataFile Version 3.0")?;
        writeln!(file, "LBM Cavity - Timestep {}", timestep)?;
        writeln!(file, "ASCII")?;
        writeln!(file, "DATASET STRUCTURED_GRID")?;
        writeln!(file, "DIMENSIONS {} {} {}", n, n, n)?;

        writeln!(file, "POINTS {} float", interior.len())?;
        for &node in &interior {
            let (x, y, z) = grid.coords(node);
            writeln!(file, "{} {} {}", x - 1, y - 1, z - 1)?;
        }

        writeln!(file, "POINT_DATA {}", interior.len())?;

        writeln!(file, "SCALARS Density float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for (density, _) in &moments {
            writeln!(file, "{:.6}", density)?;
        }

        writeln!(file, "VECTORS Velocity float")?;
        for (_, velocity) in &moments {
            writeln!(file, "{:.6} {:.6} {:.6}", velocity.x, velocity.y, velocity.z)?;
        }

        writeln!(file, "SCALARS VelocityMagnitude float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for (_, velocity) in &moments {
            writeln!(file, "{:.6}", velocity.norm())?;
        }

        // Pressure deviation from the rest density, p = cs^2 (rho - 1)
        writeln!(file, "SCALARS Pressure float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for (density, _) in &moments {
            writeln!(file, "{:.6}", (density - 1.0) * D3Q19::CS2)?;
        }

        file.flush()?;
        self.collection_entries.push((timestep, path.clone()));

        Ok(path)
    }

    /// Dump every population of the `collide` field, one node per line.
    pub fn write_field_dump(&self, fields: &Fields) -> Result<PathBuf> {
        let path = self.output_directory.join("collide-field.txt");
        let grid = fields.grid();
        let mut file = create(&path)?;

        writeln!(file, "# x y z f_0 .. f_{}", D3Q19::Q - 1)?;
        for (x, y, z) in grid.coordinates() {
            write!(file, "{} {} {}", x, y, z)?;
            for value in fields.distributions.node(grid.index(x, y, z)) {
                write!(file, " {:e}", value)?;
            }
            writeln!(file)?;
        }

        file.flush()?;
        Ok(path)
    }

    /// Dump the numeric code of every node's flag.
    pub fn write_flag_dump(&self, flags: &FlagField) -> Result<PathBuf> {
        let path = self.output_directory.join("flag-field.txt");
        let mut file = create(&path)?;

        writeln!(file, "# {:?} mode, x y z code", flags.mode())?;
        for (x, y, z) in flags.grid().coordinates() {
            writeln!(file, "{} {} {} {}", x, y, z, flags.at(x, y, z).code())?;
        }

        file.flush()?;
        Ok(path)
    }

    /// Write a ParaView collection file that groups all VTK files with time information
    pub fn write_collection(&self) -> Result<PathBuf> {
        let path = self.output_directory.join(format!("{}.pvd", self.file_prefix));
        let mut file = create(&path)?;

        writeln!(file, "<?xml version=\"1.0\"?>")?;
        writeln!(file, "<VTKFile type=\"Collection\" version=\"0.1\">")?;
        writeln!(file, "  <Collection>")?;

        for (timestep, filename) in &self.collection_entries {
            let basename = filename
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_else(|| filename.to_string_lossy());
            writeln!(file, "    <DataSet timestep=\"{}\" part=\"0\" file=\"{}\"/>",
                     *timestep as Float, basename)?;
        }

        writeln!(file, "  </Collection>")?;
        writeln!(file, "</VTKFile>")?;

        file.flush()?;
        Ok(path)
    }

    /// Snapshots that the collection file will reference
    pub fn snapshot_count(&self) -> usize {
        self.collection_entries.len()
    }
}

impl SnapshotSink for VTKWriter {
    fn write_snapshot(&mut self, fields: &Fields, timestep: usize) -> Result<()> {
        let path = self.write(fields, timestep)?;
        log::debug!("Wrote output file: {}", path.display());
        Ok(())
    }

    fn write_final(&mut self, fields: &Fields) -> Result<()> {
        let field_path = self.write_field_dump(fields)?;
        let flag_path = self.write_flag_dump(&fields.flags)?;
        log::info!("Wrote {} and {}", field_path.display(), flag_path.display());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.snapshot_count() == 0 {
            return Ok(());
        }
        let path = self.write_collection()?;
        log::info!("Wrote collection file: {} ({} snapshots)", path.display(), self.snapshot_count());
        Ok(())
    }
}
