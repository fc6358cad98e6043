use std::path::{Path, PathBuf};

use atlaspack_bundling::bundle_graph::{Bundle, BundleGraph, BundleKind};
use atlaspack_bundling::config::BundlerConfig;
use atlaspack_bundling::{Bundler, DefaultBundler};
use atlaspack_core::types::{BuildMode, FeatureFlags, FileType};
use atlaspack_test_fixtures::{AssetGraphFixture, indoc};
use pretty_assertions::assert_eq;

fn bundle(fixture: &AssetGraphFixture, config: &str) -> BundleGraph {
  let package_json = format!(
    "{{ \"@atlaspack/bundler-default\": {} }}",
    config
  );

  let (config, diagnostics) = BundlerConfig::from_package_json(
    &fixture.project_root.join("package.json"),
    &package_json,
  )
  .unwrap()
  .resolve(
    &BuildMode::Production,
    &fixture.project_root,
    &FeatureFlags::default(),
  );
  assert!(diagnostics.is_empty());

  let mut bundle_graph = BundleGraph::new();
  DefaultBundler::new(config)
    .bundle(fixture.graph(), &mut bundle_graph)
    .unwrap();
  bundle_graph
}

fn manual_bundles(bundle_graph: &BundleGraph) -> Vec<&Bundle> {
  let mut bundles: Vec<&Bundle> = bundle_graph
    .bundles()
    .filter(|bundle| bundle.kind == BundleKind::Manual)
    .collect();
  bundles.sort_by(|a, b| a.bundle_type.cmp(&b.bundle_type));
  bundles
}

fn paths(fixture: &AssetGraphFixture, bundle: &Bundle) -> Vec<String> {
  let mut paths: Vec<String> = bundle
    .asset_ids
    .iter()
    .map(|id| fixture.path_for(id).unwrap().to_string())
    .collect();
  paths.sort();
  paths
}

#[test]
fn creates_one_vendor_bundle_per_type() {
  let fixture = AssetGraphFixture::new()
    .entry("index.js")
    .sync("index.js", "vendor-a.js")
    .sync("index.js", "vendor-b.css")
    .sync("index.js", "app.js");

  let bundle_graph = bundle(
    &fixture,
    indoc! {r#"
      {
        "manualSharedBundles": [{ "name": "vendor", "assets": ["vendor*.*"] }]
      }
    "#},
  );

  let manual = manual_bundles(&bundle_graph);
  let summary: Vec<(FileType, Option<&str>, Vec<String>)> = manual
    .iter()
    .map(|bundle| {
      (
        bundle.bundle_type.clone(),
        bundle.manual_shared_bundle.as_deref(),
        paths(&fixture, bundle),
      )
    })
    .collect();

  assert_eq!(
    summary,
    vec![
      (
        FileType::Css,
        Some("vendor"),
        vec![String::from("vendor-b.css")]
      ),
      (
        FileType::Js,
        Some("vendor"),
        vec![String::from("vendor-a.js")]
      ),
    ]
  );

  let index = bundle_graph
    .bundles()
    .find(|bundle| bundle.main_entry_id == Some(fixture.asset_id("index.js")))
    .unwrap();
  assert_eq!(paths(&fixture, index), vec!["app.js", "index.js"]);

  let group = &bundle_graph.bundle_groups_containing(&index.id)[0];
  for bundle in manual {
    assert!(bundle_graph
      .bundles_in_group(&group.id, false)
      .contains(&bundle));
  }
}

#[test]
fn manual_bundle_ids_can_be_computed_ahead_of_time() {
  let fixture = AssetGraphFixture::new()
    .entry("index.js")
    .sync("index.js", "vendor-a.js");

  let bundle_graph = bundle(
    &fixture,
    r#"{ "manualSharedBundles": [{ "name": "vendor", "assets": ["vendor*.*"] }] }"#,
  );

  let manual = manual_bundles(&bundle_graph);
  assert_eq!(manual.len(), 1);
  assert_eq!(
    manual[0].id,
    bundle_graph.resolve_bundle_id("vendor", &FileType::Js, Path::new("dist"))
  );
  assert_eq!(
    manual[0].name,
    format!("vendor.{}.js", &manual[0].id[..8])
  );
}

#[test]
fn split_bundles_keep_their_partitions_across_builds() {
  let vendors = ["a", "b", "c", "d", "e", "f"];
  let fixture = vendors.iter().fold(
    AssetGraphFixture::new().entry("index.js"),
    |fixture, name| fixture.sync("index.js", &format!("node_modules/{}.js", name)),
  );

  let config = r#"{
    "manualSharedBundles": [{ "name": "vendor", "assets": ["node_modules/*.js"], "split": 2 }]
  }"#;

  let bundle_graph = bundle(&fixture, config);
  let partition_ids = [
    bundle_graph.resolve_bundle_id("vendor-0", &FileType::Js, Path::new("dist")),
    bundle_graph.resolve_bundle_id("vendor-1", &FileType::Js, Path::new("dist")),
  ];

  let manual = manual_bundles(&bundle_graph);
  assert!(!manual.is_empty() && manual.len() <= 2);

  let mut extracted: Vec<String> = Vec::new();
  for bundle in &manual {
    assert!(partition_ids.contains(&bundle.id));
    extracted.extend(paths(&fixture, bundle));
  }
  extracted.sort();

  let expected: Vec<String> = vendors
    .iter()
    .map(|name| format!("node_modules/{}.js", name))
    .collect();
  assert_eq!(extracted, expected);

  let rebuilt = bundle(&fixture, config);
  let mut first: Vec<(&str, &Vec<String>)> = manual
    .iter()
    .map(|bundle| (bundle.id.as_str(), &bundle.asset_ids))
    .collect();
  let mut second: Vec<(&str, &Vec<String>)> = manual_bundles(&rebuilt)
    .into_iter()
    .map(|bundle| (bundle.id.as_str(), &bundle.asset_ids))
    .collect();
  first.sort();
  second.sort();
  assert_eq!(first, second);
}

#[test]
fn root_restricts_matching_to_its_sync_subgraph() {
  let fixture = AssetGraphFixture::new()
    .entry("index.js")
    .lazy("index.js", "pages/a.js")
    .lazy("index.js", "pages/b.js")
    .sync("pages/a.js", "lib/x.js")
    .sync("pages/b.js", "lib/y.js");

  let bundle_graph = bundle(
    &fixture,
    r#"{
      "manualSharedBundles": [{ "name": "a-libs", "root": "pages/a.js", "assets": ["lib/*.js"] }]
    }"#,
  );

  let manual = manual_bundles(&bundle_graph);
  assert_eq!(manual.len(), 1);
  assert_eq!(paths(&fixture, manual[0]), vec!["lib/x.js"]);

  let b = bundle_graph
    .bundles()
    .find(|bundle| bundle.main_entry_id == Some(fixture.asset_id("pages/b.js")))
    .unwrap();
  assert_eq!(paths(&fixture, b), vec!["lib/y.js", "pages/b.js"]);
}

#[test]
fn globs_may_reach_outside_the_project_root() {
  let fixture = AssetGraphFixture::with_project_root(PathBuf::from("/repo/packages/web"))
    .entry("index.js")
    .sync("index.js", "../shared/util.js")
    .sync("index.js", "local.js");

  let bundle_graph = bundle(
    &fixture,
    r#"{ "manualSharedBundles": [{ "name": "shared", "assets": ["../shared/*.js"] }] }"#,
  );

  let manual = manual_bundles(&bundle_graph);
  assert_eq!(manual.len(), 1);
  assert_eq!(paths(&fixture, manual[0]), vec!["../shared/util.js"]);
}

#[test]
fn types_filter_which_assets_match() {
  let fixture = AssetGraphFixture::new()
    .entry("index.js")
    .sync("index.js", "vendor.js")
    .sync("index.js", "vendor.css");

  let bundle_graph = bundle(
    &fixture,
    r#"{ "manualSharedBundles": [{ "name": "styles", "assets": ["*"], "types": ["css"] }] }"#,
  );

  let manual = manual_bundles(&bundle_graph);
  assert_eq!(manual.len(), 1);
  assert_eq!(manual[0].bundle_type, FileType::Css);
  assert_eq!(paths(&fixture, manual[0]), vec!["vendor.css"]);
}

#[test]
fn globs_matching_nothing_produce_no_bundle() {
  let fixture = AssetGraphFixture::new()
    .entry("index.js")
    .sync("index.js", "app.js");

  let bundle_graph = bundle(
    &fixture,
    r#"{ "manualSharedBundles": [{ "name": "vendor", "assets": ["vendor/**"] }] }"#,
  );

  assert!(manual_bundles(&bundle_graph).is_empty());
  assert_eq!(bundle_graph.bundles().count(), 1);
}
