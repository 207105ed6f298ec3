use crate::Img2XnbParameters;
use anyhow::{bail, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use log::{debug, info};
use xnb::{Content, ContentGraph, SurfaceFormat, Texture2D, TypeRegistry, WriterOptions};

// generate `Statistics` struct with `CPUProfiler`s
impl_stats_struct!(pub Statistics; load, vflip, channels, mipmaps, serialize, save);

pub struct Img2Xnb {
    params: Img2XnbParameters,
    stats: Statistics<'static>,
}

impl Img2Xnb {
    /// Loads the image.
    fn load_image(&mut self) -> Result<DynamicImage> {
        measure_scope!(self.stats.load);

        image::open(&self.params.input)
            .with_context(|| format!("cannot open image {}", self.params.input.display()))
    }

    fn extract_dimensions(&self, image: &DynamicImage) -> Result<(u32, u32)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("image has invalid dimensions {}x{}", width, height);
        }
        Ok((width, height))
    }

    /// Vertically flips the image if requested via parameters.
    fn v_flip(&mut self, image: DynamicImage) -> DynamicImage {
        measure_scope!(self.stats.vflip);

        if self.params.v_flip {
            image.flipv()
        } else {
            image
        }
    }

    /// Converts the image to 8-bit RGBA, the only format written by this tool.
    fn convert_channels(&mut self, image: DynamicImage) -> DynamicImage {
        measure_scope!(self.stats.channels);

        match image {
            DynamicImage::ImageRgba8(_) => image,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        }
    }

    /// Generates the mip chain down to 1x1 and returns all images including
    /// the passed in full resolution `image`.
    fn generate_mipmaps(&mut self, image: DynamicImage) -> Vec<DynamicImage> {
        measure_scope!(self.stats.mipmaps);

        let mut mipmaps = vec![image];
        if self.params.no_mipmaps {
            return mipmaps;
        }

        loop {
            let higher = &mipmaps[mipmaps.len() - 1];
            if higher.width() == 1 && higher.height() == 1 {
                break;
            }
            let lower = higher.resize_exact(
                (higher.width() / 2).max(1),
                (higher.height() / 2).max(1),
                FilterType::Triangle,
            );
            mipmaps.push(lower);
        }
        debug!("generated {} mip levels", mipmaps.len());
        mipmaps
    }

    fn serialize(&mut self, width: u32, height: u32, mipmaps: Vec<DynamicImage>) -> Result<Vec<u8>> {
        measure_scope!(self.stats.serialize);

        let levels = mipmaps.into_iter().map(|m| m.into_bytes()).collect();
        let texture = Texture2D::new(SurfaceFormat::Rgba8, width, height, levels);
        let graph = ContentGraph::new(Content::Texture2D(texture));

        let options = WriterOptions::default()
            .with_platform(self.params.platform)
            .with_compression(self.params.compression);
        let registry = TypeRegistry::with_builtins();

        let mut bytes = vec![];
        xnb::serialize_with_options(&registry, &graph, &mut bytes, &options)?;
        Ok(bytes)
    }

    fn save(&mut self, bytes: Vec<u8>) -> Result<()> {
        measure_scope!(self.stats.save);

        let default_output = self.params.input.with_extension("xnb");
        let save_path = self.params.output.clone().unwrap_or(default_output);
        std::fs::write(&save_path, &bytes)
            .with_context(|| format!("cannot write {}", save_path.display()))?;

        info!("wrote {} ({} bytes)", save_path.display(), bytes.len());
        Ok(())
    }

    /// Performs the conversion specified by `Img2XnbParameters`. Returns the
    /// timings of individual stages.
    pub fn convert(params: Img2XnbParameters) -> Result<Statistics<'static>> {
        let mut tool = Img2Xnb {
            params,
            stats: Default::default(),
        };

        let image = tool.load_image()?;
        let (width, height) = tool.extract_dimensions(&image)?;
        let image = tool.v_flip(image);
        let image = tool.convert_channels(image);
        let mipmaps = tool.generate_mipmaps(image);
        let bytes = tool.serialize(width, height, mipmaps)?;
        tool.save(bytes)?;

        Ok(tool.stats)
    }
}
