use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;
use structopt::StructOpt;
use xnb::{Content, ContentGraph, ContentReader, ReaderOptions, Texture2D, TypeRegistry};

#[derive(StructOpt, Debug)]
#[structopt(name = "xnbinfo", about = "Prints the structure of an XNB file")]
struct Opt {
    /// Lists mip levels of textures.
    #[structopt(short, long)]
    levels: bool,

    /// JSON file with reader options.
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,
}

fn load_options(path: &Option<PathBuf>) -> Result<ReaderOptions> {
    match path {
        None => Ok(ReaderOptions::default()),
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    let options = load_options(&opt.config)?;
    let bytes = std::fs::read(&opt.input)
        .with_context(|| format!("cannot read {}", opt.input.display()))?;

    let registry = TypeRegistry::with_builtins();
    let mut reader = ContentReader::with_options(&registry, options);
    let result = reader.read_root(&bytes);

    if let Some(header) = reader.header() {
        println!("magic=XNB (ok)");
        match header.platform() {
            Some(platform) => println!("platform={}", platform),
            None => println!("platform={:?} (unknown)", header.platform as char),
        }
        println!("version={}", header.version);
        println!("profile={:?}", header.profile);
        match header.uncompressed_len {
            Some(len) => println!("compression={:?} uncompressed={}", header.compression, len),
            None => println!("compression={:?}", header.compression),
        }
    }
    for (index, descriptor) in reader.manifest().enumerate() {
        println!(
            "type[{}]={} v{}",
            index + 1,
            descriptor.type_name(),
            descriptor.version()
        );
    }

    let graph = match result {
        Ok(graph) => graph,
        Err(e) => {
            warn!("reader stopped in state {:?}", reader.state());
            return Err(e).with_context(|| format!("cannot load {}", opt.input.display()));
        }
    };

    println!("shared={}", reader.shared_count());
    println!("root={}", summary(&graph, graph.root()));

    if opt.levels {
        for (_, node) in graph.nodes() {
            if let Content::Texture2D(texture) = &node.content {
                print_levels(texture);
            }
        }
    }
    Ok(())
}

fn summary(graph: &ContentGraph, value: &Content) -> String {
    match value {
        Content::Null => "null".to_owned(),
        Content::Ref(id) => match graph.resolve(value) {
            Some(target) => format!("shared[{}] -> {}", id.index(), summary(graph, target)),
            None => format!("shared[{}] (unresolved)", id.index()),
        },
        Content::String(s) => format!("string {:?}", s),
        Content::Bytes(b) => format!("bytes len={}", b.len()),
        Content::Array { element, items } => format!("array<{}> len={}", element, items.len()),
        Content::Dictionary { key, value, entries } => {
            format!("dictionary<{},{}> len={}", key, value, entries.len())
        }
        Content::Texture2D(t) => format!(
            "texture2d format={:?} width={} height={} levels={}",
            t.format,
            t.width,
            t.height,
            t.mip_count()
        ),
        Content::Effect(e) => format!("effect bytecode={}", e.bytecode.len()),
        Content::Mesh(m) => format!(
            "mesh format={:?} vertices={} indices={}",
            m.vertex_format,
            m.vertex_count(),
            m.index_count()
        ),
        Content::Material(m) => format!("material blend_mode={:?}", m.blend_mode),
        Content::Record(r) => format!("{} fields={}", r.type_name, r.fields.len()),
        other => format!("{:?}", other),
    }
}

fn print_levels(texture: &Texture2D) {
    for (level, data) in texture.levels.iter().enumerate() {
        let (width, height) = texture.level_dimensions(level as u32);
        let expected = texture
            .format
            .level_size(texture.width, texture.height, level as u32)
            .unwrap_or(0);
        println!(
            "mipmap level={} width={} height={} size={} expected={}",
            level,
            width,
            height,
            data.len(),
            expected
        );
    }
}
