use std::{
    fs::{create_dir_all, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use log::{debug, warn};
use vtkio::model::*;

use crate::{floating_type_mod::FT, FluidSimulation, V3};

fn to_array(v: &V3) -> [FT; 3] {
    [v.x, v.y, v.z]
}

/**
 * Writes numbered legacy VTK snapshots of the fluid particles and a `.vtk.series` index that lets
 * ParaView load them as one time series.
 */
pub(crate) struct VtkExporter {
    /// snapshots are written as `folder/basename-00001.vtk` and listed in `folder/basename.vtk.series`
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
    series_file: File,
}

impl VtkExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> anyhow::Result<VtkExporter> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder).with_context(|| format!("failed creating output folder `{}`", folder.display()))?;

        let series_path = folder.join(format!("{}.vtk.series", basename));
        let mut series_file =
            File::create(&series_path).with_context(|| format!("failed creating `{}`", series_path.display()))?;
        let series_prelude_str = "{\n\"file-series-version\": \"1.0\",\n\"files\": [";
        series_file.write_all(series_prelude_str.as_bytes())?;

        Ok(VtkExporter {
            series_file,
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    pub(crate) fn add_snapshot(&mut self, fluid_simulation: &FluidSimulation) -> anyhow::Result<()> {
        if self.snapshot_number > 1 {
            self.series_file.write_all(",".as_bytes())?;
        }

        let vtk_filename = format!("{}-{:05}.vtk", self.basename, self.snapshot_number);
        let particles = &fluid_simulation.particles;
        write_vtk_file(
            self.folder.join(&vtk_filename),
            &particles.position,
            vec![
                ("density".into(), particles.density.clone()),
                ("pressure".into(), particles.pressure.clone()),
            ],
            vec![("velocity".into(), particles.velocity.clone())],
        )?;

        write!(
            self.series_file,
            "\n{{ \"name\": \"{}\", \"time\": {} }}",
            vtk_filename,
            fluid_simulation.time()
        )?;
        debug!("wrote snapshot {}", vtk_filename);

        self.snapshot_number += 1;
        Ok(())
    }
}

impl Drop for VtkExporter {
    fn drop(&mut self) {
        let series_end_str = "\n]\n}";
        if let Err(err) = self.series_file.write_all(series_end_str.as_bytes()) {
            warn!("failed finishing series file for `{}`: {}", self.basename, err);
        }
    }
}

/** Writes the static boundary particles with their normals to `folder/basename-boundary.vtk`. */
pub(crate) fn write_boundary_file(
    folder: &Path,
    basename: &str,
    fluid_simulation: &FluidSimulation,
) -> anyhow::Result<PathBuf> {
    create_dir_all(folder).with_context(|| format!("failed creating output folder `{}`", folder.display()))?;

    let path = folder.join(format!("{}-boundary.vtk", basename));
    let boundary = fluid_simulation.boundary();
    write_vtk_file(
        &path,
        &boundary.positions,
        Vec::new(),
        vec![("normal".into(), boundary.normals.clone())],
    )?;
    Ok(path)
}

/**
 * Point cloud as poly data with one vertex cell per point. Every attribute needs one entry per point.
 */
pub(crate) fn write_vtk_file<P: Into<PathBuf>>(
    path: P,
    positions: &[V3],
    data_ft: Vec<(String, Vec<FT>)>,
    data_vec: Vec<(String, Vec<V3>)>,
) -> anyhow::Result<()> {
    let num_particles = positions.len();

    let mut data_arrays: Vec<DataArray> = Vec::new();

    for (name, arr) in data_ft {
        assert_eq!(arr.len(), num_particles, "attribute `{}` has wrong length", name);
        let mut data_array = DataArray::scalars(name, 1);
        data_array.data = arr.into();
        data_arrays.push(data_array);
    }

    for (name, arr) in data_vec {
        assert_eq!(arr.len(), num_particles, "attribute `{}` has wrong length", name);
        let mut data_array = DataArray::scalars(name, 3);
        data_array.data = arr.iter().flat_map(to_array).collect::<Vec<_>>().into();
        data_arrays.push(data_array);
    }

    let path = path.into();

    let vtk_verts: Vec<u32> = (0..num_particles).flat_map(|i| [1, i as u32]).collect();
    let vtk_points: Vec<FT> = positions.iter().flat_map(to_array).collect();

    let vtk = Vtk {
        version: Version::new((4, 2)),
        byte_order: ByteOrder::BigEndian,
        title: String::from("SPH Particles 1.0"),
        file_path: Some(path.clone()),
        data: DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(PolyDataPiece {
                points: vtk_points.into(),
                verts: VertexNumbers::Legacy {
                    num_cells: num_particles as u32,
                    vertices: vtk_verts,
                }
                .into(),
                data: Attributes {
                    cell: Vec::new(),
                    point: data_arrays.into_iter().map(Attribute::DataArray).collect(),
                },
                ..Default::default()
            }))],
        },
    };
    vtk.export(&path)
        .map_err(|err| anyhow!("failed writing `{}`: {:?}", path.display(), err))
}
