//! Persisted run outputs.
//!
//! The poster plus the editable bundle (`layout.json`, `style.json`,
//! `manifest.json`, `copy.txt` and optionally `wireframe.svg`) are written to the
//! run's artifacts directory. Every composed candidate is also kept under
//! `iterations/<n>/` for later inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::fs;

use crate::adapters::local::xml_escape;
use crate::domain::{Canvas, Composition, Element, ElementKind, PosterSpec};

use super::event_store::EventStore;

/// Where the outputs of a run were written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub poster: PathBuf,
    pub layout: PathBuf,
    pub style: Option<PathBuf>,
    pub manifest: PathBuf,
    pub copy: PathBuf,
    pub wireframe: Option<PathBuf>,
}

impl OutputPaths {
    pub fn all(&self) -> Vec<&Path> {
        let mut paths = vec![self.poster.as_path(), self.layout.as_path()];
        paths.extend(self.style.as_deref());
        paths.push(&self.manifest);
        paths.push(&self.copy);
        paths.extend(self.wireframe.as_deref());
        paths
    }
}

/// Write the poster and its bundle for `composition`
pub async fn write_outputs(
    store: &EventStore,
    spec: &PosterSpec,
    composition: &Composition,
    wireframe: bool,
) -> Result<OutputPaths> {
    let poster_name = format!("poster.{}", composition.image.extension());
    let poster = store.store_artifact(&poster_name, &composition.image.data).await?;

    let layout_json = serde_json::to_vec_pretty(spec.layout()).context("Failed to serialize layout")?;
    let layout = store.store_artifact("layout.json", &layout_json).await?;

    let style = match spec.style() {
        Some(style) => {
            let json = serde_json::to_vec_pretty(style).context("Failed to serialize style")?;
            Some(store.store_artifact("style.json", &json).await?)
        }
        None => None,
    };

    let manifest_json =
        serde_json::to_vec_pretty(&composition.manifest()).context("Failed to serialize manifest")?;
    let manifest = store.store_artifact("manifest.json", &manifest_json).await?;

    let copy = store
        .store_artifact("copy.txt", collect_copy(spec).as_bytes())
        .await?;

    let wireframe = if wireframe {
        let svg = render_wireframe(composition.canvas, spec.layout());
        Some(store.store_artifact("wireframe.svg", svg.as_bytes()).await?)
    } else {
        None
    };

    Ok(OutputPaths {
        poster,
        layout,
        style,
        manifest,
        copy,
        wireframe,
    })
}

/// Keep one iteration's candidate poster and copy; returns the iteration directory
pub async fn write_iteration(store: &EventStore, spec: &PosterSpec, composition: &Composition) -> Result<PathBuf> {
    let dir = format!("iterations/{}", composition.iteration);
    let poster = store
        .store_artifact(
            &format!("{}/poster.{}", dir, composition.image.extension()),
            &composition.image.data,
        )
        .await?;
    store
        .store_artifact(&format!("{}/copy.txt", dir), collect_copy(spec).as_bytes())
        .await?;

    poster
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("Iteration artifact has no parent: {}", poster.display()))
}

/// Copy the outputs into `dir`, returning the new locations
pub async fn export_bundle(paths: &OutputPaths, dir: &Path) -> Result<OutputPaths> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    async fn copy_into(source: &Path, dir: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .with_context(|| format!("Output has no file name: {}", source.display()))?;
        let target = dir.join(name);
        fs::copy(source, &target)
            .await
            .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
        Ok(target)
    }

    let style = match &paths.style {
        Some(path) => Some(copy_into(path, dir).await?),
        None => None,
    };
    let wireframe = match &paths.wireframe {
        Some(path) => Some(copy_into(path, dir).await?),
        None => None,
    };

    Ok(OutputPaths {
        poster: copy_into(&paths.poster, dir).await?,
        layout: copy_into(&paths.layout, dir).await?,
        style,
        manifest: copy_into(&paths.manifest, dir).await?,
        copy: copy_into(&paths.copy, dir).await?,
        wireframe,
    })
}

/// Committed text copy in z-order, one element per line
fn collect_copy(spec: &PosterSpec) -> String {
    spec.layout()
        .iter()
        .filter_map(|e| spec.asset(&e.id).and_then(|a| a.text()))
        .map(|text| format!("{text}\n"))
        .collect()
}

/// Outline preview of the layout
pub fn render_wireframe(canvas: Canvas, layout: &[Element]) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\
         <rect width=\"{w}\" height=\"{h}\" fill=\"#ffffff\" stroke=\"#000000\"/>",
        w = canvas.width,
        h = canvas.height,
    );

    for element in layout {
        let stroke = match element.kind {
            ElementKind::Image => "#888888",
            ElementKind::Logo => "#3366cc",
            ElementKind::Text => "#cc3333",
        };
        let b = element.bbox;
        svg.push_str(&format!(
            "<g><rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"none\" stroke=\"{stroke}\" stroke-dasharray=\"8 4\"/>\
             <text x=\"{}\" y=\"{}\" font-family=\"monospace\" font-size=\"14\" fill=\"{stroke}\">{} (z={})</text></g>",
            b.x,
            b.y,
            b.w,
            b.h,
            b.x + 6,
            b.y + 18,
            xml_escape(&element.id),
            element.z,
        ));
    }

    svg.push_str("</svg>");
    svg
}
