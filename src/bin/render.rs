//! Desired-state renderer
//!
//! Prints every object the operator would apply for an image, as
//! multi-document YAML. Certificates are freshly generated and not stored.
//!
//! Usage: cargo run --bin render -- <image-path> [resources-dir] > manifests.yaml

use anyhow::Context;

use kfserving_operator::{
    adapters::oci_image::ImageDescriptor,
    certs,
    config::OperatorConfig,
    crd::StaticResources,
    reconcilers::{apply::Manifests, render, ReconciliationInput},
};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let image_path = args
        .next()
        .context("usage: render <image-path> [resources-dir]")?;

    let config = OperatorConfig::load()?;
    let resources_dir = args
        .next()
        .map(Into::into)
        .unwrap_or_else(|| config.resources_dir.clone());
    let resources = StaticResources::load(&resources_dir)?;

    let ports = config.ports();
    ports.validate()?;

    let input = ReconciliationInput {
        namespace: config.namespace.clone(),
        app_name: config.app_name.clone(),
        image: ImageDescriptor::public(image_path),
        metrics_port: ports.metrics_port,
        webhook_port: ports.webhook_port,
        cert_bundle: certs::generate(&config.app_name, &config.namespace)?,
    };

    let state = render(&input, &resources)?;
    let manifests = Manifests::build(&state, &config.app_name, &config.namespace);
    print!("{}", manifests.to_yaml()?);
    Ok(())
}
