use std::collections::BTreeSet;

use tracing::{debug, instrument};

use super::types::IdealGraph;

/// Assigns every root to the bundle groups it loads in
///
/// Group-creating roots head their own group. Roots reached through parallel or inline edges join
/// every group of the root that loads them, which is propagated to a fixpoint so chains and cycles
/// settle.
#[instrument(level = "debug", skip_all)]
pub fn assign_bundle_groups(ideal: &mut IdealGraph) {
  ideal.own_groups = ideal
    .roots
    .values()
    .map(|root| {
      let groups = if root.triggers.creates_group() {
        BTreeSet::from([root.asset])
      } else {
        BTreeSet::new()
      };
      (root.asset, groups)
    })
    .collect();

  let mut rounds = 0;
  loop {
    rounds += 1;
    let mut changed = false;

    for edge in &ideal.bundle_edges {
      if edge.triggers.creates_group() || edge.from == edge.to {
        continue;
      }

      let parent_groups = ideal
        .own_groups
        .get(&edge.from)
        .cloned()
        .unwrap_or_default();

      let child_groups = ideal.own_groups.entry(edge.to).or_default();
      for group in parent_groups {
        changed |= child_groups.insert(group);
      }
    }

    if !changed {
      break;
    }
  }

  debug!(
    groups = ideal.group_roots().count(),
    rounds,
    "ideal graph: assigned bundle groups"
  );
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::ideal_graph::test_utils::{Phase, ideal_graph_until};
  use atlaspack_test_fixtures::AssetGraphFixture;

  #[test]
  fn parallel_roots_join_their_parents_groups() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .lazy("index.js", "page.js")
      .parallel("page.js", "chunk.js")
      .parallel("chunk.js", "more.js");

    let built = ideal_graph_until(&fixture, Phase::Groups);
    let page = built.key(&fixture, "page.js");

    assert_eq!(
      built.ideal.own_groups[&built.key(&fixture, "more.js")],
      BTreeSet::from([page])
    );
    assert_eq!(
      built.ideal.own_groups[&built.key(&fixture, "chunk.js")],
      BTreeSet::from([page])
    );

    let (own, reused) = built.ideal.group_members(page);
    assert_eq!(own.len(), 3);
    assert!(reused.is_empty());
  }

  #[test]
  fn parallel_cycles_settle() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .parallel("index.js", "a.js")
      .parallel("a.js", "b.js")
      .parallel("b.js", "a.js");

    let built = ideal_graph_until(&fixture, Phase::Groups);
    let index = built.key(&fixture, "index.js");

    for path in ["a.js", "b.js"] {
      assert_eq!(
        built.ideal.own_groups[&built.key(&fixture, path)],
        BTreeSet::from([index])
      );
    }
  }

  #[test]
  fn reused_roots_load_in_the_reusers_groups() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .lazy("index.js", "page.js")
      .lazy("index.js", "modal.js")
      .sync("modal.js", "page.js");

    let built = ideal_graph_until(&fixture, Phase::Groups);
    let page = built.key(&fixture, "page.js");
    let modal = built.key(&fixture, "modal.js");

    assert_eq!(built.ideal.all_groups(page), BTreeSet::from([page, modal]));

    let (own, reused) = built.ideal.group_members(modal);
    assert_eq!(own, BTreeSet::from([modal]));
    assert_eq!(reused, BTreeSet::from([page]));
  }

  #[test]
  fn reuse_is_followed_through_chains() {
    let fixture = AssetGraphFixture::new()
      .entry("index.js")
      .lazy("index.js", "page.js")
      .lazy("index.js", "widget.js")
      .lazy("index.js", "deep.js")
      .sync("page.js", "widget.js")
      .sync("widget.js", "deep.js");

    let built = ideal_graph_until(&fixture, Phase::Groups);
    let page = built.key(&fixture, "page.js");
    let widget = built.key(&fixture, "widget.js");
    let deep = built.key(&fixture, "deep.js");

    let (own, reused) = built.ideal.group_members(page);
    assert_eq!(own, BTreeSet::from([page]));
    assert_eq!(reused, BTreeSet::from([widget, deep]));

    assert_eq!(
      built.ideal.all_groups(deep),
      BTreeSet::from([page, widget, deep])
    );
  }
}
