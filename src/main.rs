use std::fs::{self, File};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use memmap2::Mmap;
use rayon::prelude::*;
use rootcause::prelude::*;

use modelconv::Rc;
use modelconv::export::{FileFormat, GltfExportOptions, GltfExporter, export_model};
use modelconv::import::{ImportCallbacks, file_name, import_file};
use modelconv::models::color::Color;
use modelconv::models::material::Material;
use modelconv::models::model::Model;

/// Convert 3DS and glTF models to glTF
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one or more models
    Convert {
        /// Model files (.3ds, .gltf, .glb)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Glb)]
        format: OutputFormat,

        /// Directory receiving the converted files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Color of materials synthesized for untextured geometry, as RRGGBB
        #[arg(long, value_parser = parse_color, default_value = "c8c8c8")]
        default_color: Color,
    },
    /// Print a summary of a model
    Info {
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Glb,
    Gltf,
}

impl OutputFormat {
    fn file_format(self) -> FileFormat {
        match self {
            OutputFormat::Glb => FileFormat::Binary,
            OutputFormat::Gltf => FileFormat::Text,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Glb => "glb",
            OutputFormat::Gltf => "gltf",
        }
    }
}

fn parse_color(value: &str) -> Result<Color, String> {
    Color::from_hex_string(value).ok_or_else(|| format!("invalid color {value:?}, expected RRGGBB"))
}

/// Resolves external buffers and textures next to the input file.
struct DirectoryCallbacks {
    directory: PathBuf,
    default_material: Material,
}

impl DirectoryCallbacks {
    fn new(input: &Path, default_color: Color) -> Self {
        let mut default_material = Material::phong();
        default_material.color = default_color;
        DirectoryCallbacks {
            directory: input.parent().map(Path::to_path_buf).unwrap_or_default(),
            default_material,
        }
    }

    /// Case-insensitive lookup of `name` in the input directory.
    fn find_file(&self, name: &str) -> Option<PathBuf> {
        let exact = self.directory.join(name);
        if exact.is_file() {
            return Some(exact);
        }
        fs::read_dir(&self.directory)
            .ok()?
            .filter_map(Result::ok)
            .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
            .map(|entry| entry.path())
    }
}

impl ImportCallbacks for DirectoryCallbacks {
    fn default_material(&self) -> Material {
        self.default_material.clone()
    }

    fn file_buffer(&self, name: &str) -> Option<Rc<[u8]>> {
        let path = self.find_file(file_name(name))?;
        fs::read(path).ok().map(Rc::from)
    }
}

fn load_model(input: &Path, default_color: Color) -> Result<Model, Report> {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(input).context("Failed to open input file")?;
    let callbacks = DirectoryCallbacks::new(input, default_color);

    let model = if file.metadata()?.len() == 0 {
        import_file(&name, &[], &callbacks)
    } else {
        let mmap = unsafe { Mmap::map(&file)? };
        import_file(&name, &mmap[..], &callbacks)
    }
    .context("Failed to import model")?;
    Ok(model)
}

fn convert_file(
    input: &Path,
    format: OutputFormat,
    output_dir: &Path,
    default_color: Color,
) -> Result<Vec<PathBuf>, Report> {
    let model = load_model(input, default_color)?;
    let base_name = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let options = GltfExportOptions::builder()
        .generator(concat!("modelconv ", env!("CARGO_PKG_VERSION")))
        .pretty(true)
        .base_name(base_name)
        .build();
    let exporter = GltfExporter::new(options);
    let files = export_model(&[&exporter], &model, format.file_format(), format.extension())
        .context("Failed to export model")?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = output_dir.join(&file.name);
        fs::write(&path, &file.content).context("Failed to write output file")?;
        written.push(path);
    }
    Ok(written)
}

fn convert(
    inputs: Vec<PathBuf>,
    format: OutputFormat,
    output_dir: PathBuf,
    default_color: Color,
) -> Result<(), Report> {
    fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

    let results: Vec<_> = inputs
        .par_iter()
        .map(|input| (input, convert_file(input, format, &output_dir, default_color)))
        .collect();

    let mut failures = 0;
    for (input, result) in results {
        match result {
            Ok(paths) => {
                for path in paths {
                    println!("{} -> {}", input.display(), path.display());
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {e}", input.display());
            }
        }
    }

    if failures > 0 {
        return Err(
            rootcause::report!("{} of {} conversions failed", failures, inputs.len()).into(),
        );
    }
    Ok(())
}

fn info(input: PathBuf, json: bool) -> Result<(), Report> {
    let model = load_model(&input, Color::new(200, 200, 200))?;
    let summary = model.summary();

    if json {
        let text = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", input.display());
    println!("  meshes:         {} ({} instances)", summary.meshes, summary.mesh_instances);
    println!("  materials:      {}", summary.materials);
    println!("  nodes:          {}", summary.nodes);
    println!("  vertices:       {}", summary.vertices);
    println!("  vertex colors:  {}", summary.vertex_colors);
    println!("  normals:        {}", summary.normals);
    println!("  uvs:            {}", summary.uvs);
    println!("  triangles:      {}", summary.triangles);
    for group in &summary.property_groups {
        println!("  {}:", group.name);
        for property in &group.properties {
            println!("    {}: {}", property.name, property.value);
        }
    }
    Ok(())
}

fn main() -> Result<(), Report> {
    let args = Args::parse();

    match args.command {
        Command::Convert {
            inputs,
            format,
            output_dir,
            default_color,
        } => convert(inputs, format, output_dir, default_color),
        Command::Info { input, json } => info(input, json),
    }
}
