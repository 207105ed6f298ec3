use crate::tool::Img2Xnb;
use std::path::PathBuf;
use structopt::StructOpt;
use xnb::{Compression, TargetPlatform};

#[macro_use]
mod perf;
mod tool;

#[derive(StructOpt, Debug)]
#[structopt(name = "img2xnb", about = "Converts an image into an XNB texture")]
pub struct Img2XnbParameters {
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,

    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    #[structopt(short, long)]
    v_flip: bool,

    #[structopt(long)]
    no_mipmaps: bool,

    /// One of `none`, `deflate` or `lz4`.
    #[structopt(short, long, default_value = "deflate")]
    compression: Compression,

    #[structopt(short, long, default_value = "desktopgl")]
    platform: TargetPlatform,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let params = Img2XnbParameters::from_args();
    let stats = Img2Xnb::convert(params)?;

    for profiler in stats.all() {
        if profiler.runs() > 0 {
            log::info!("{}={}ms", profiler.name(), profiler.total_time().as_millis());
        }
    }
    Ok(())
}
