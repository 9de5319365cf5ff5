//! Skill catalog: the static node/path data for one config mode.
//!
//! Each mode ships an embedded `skill_tree_config.json`. Loading flattens the
//! four trees (A, B, C, D in that order, nodes in file order) into a single
//! node list whose positions are the catalog indices used by the build codec,
//! and builds an id → index table so every lookup walks ids, never references.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// Used when no catalog (or no max value) can be loaded.
pub const DEFAULT_MAX_SKILL_POINTS: u32 = 76;

const MAIN_CONFIG_JSON: &str = include_str!("../data/skill_tree_config.json");
const PROTO_CONFIG_JSON: &str = include_str!("../data/proto/skill_tree_config.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TreeId {
    A,
    B,
    C,
    D,
}

impl TreeId {
    pub const ALL: [TreeId; 4] = [TreeId::A, TreeId::B, TreeId::C, TreeId::D];

    /// Parse a tree letter (case-insensitive).
    pub fn parse(s: &str) -> Option<TreeId> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(TreeId::A),
            "B" => Some(TreeId::B),
            "C" => Some(TreeId::C),
            "D" => Some(TreeId::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TreeId::A => "A",
            TreeId::B => "B",
            TreeId::C => "C",
            TreeId::D => "D",
        }
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tree set is being planned: the stable one or the prototype one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    #[default]
    Main,
    Proto,
}

impl ConfigMode {
    /// `"main"` and `"current"` both name the stable set.
    pub fn parse(s: &str) -> Result<ConfigMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "main" | "current" => Ok(ConfigMode::Main),
            "proto" => Ok(ConfigMode::Proto),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigMode::Main => "main",
            ConfigMode::Proto => "proto",
        }
    }
}

/// Prerequisite expression of a node.
///
/// A flat list is AND (every id needs a point); a list of lists is OR over
/// groups (some group needs every id funded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prerequisites {
    All(Vec<String>),
    AnyOf(Vec<Vec<String>>),
}

impl Default for Prerequisites {
    fn default() -> Self {
        Prerequisites::All(Vec::new())
    }
}

impl Prerequisites {
    pub fn is_empty(&self) -> bool {
        match self {
            Prerequisites::All(ids) => ids.is_empty(),
            Prerequisites::AnyOf(groups) => groups.is_empty(),
        }
    }

    /// Evaluate the expression with `met` deciding whether one id is funded.
    pub fn is_satisfied(&self, met: impl Fn(&str) -> bool) -> bool {
        match self {
            Prerequisites::All(ids) => ids.iter().all(|id| met(id.as_str())),
            Prerequisites::AnyOf(groups) => {
                groups.iter().any(|group| group.iter().all(|id| met(id.as_str())))
            }
        }
    }

    /// Every id named anywhere in the expression, OR groups flattened.
    pub fn ids(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Prerequisites::All(ids) => Box::new(ids.iter().map(String::as_str)),
            Prerequisites::AnyOf(groups) => {
                Box::new(groups.iter().flatten().map(String::as_str))
            }
        }
    }

    /// True if `id` appears in any group.
    pub fn mentions(&self, id: &str) -> bool {
        self.ids().any(|p| p == id)
    }

    /// Would this expression fail if `id` lost its last point?
    ///
    /// AND lists depend on every member. OR lists depend on `id` only when
    /// every group either uses it or is already unsatisfied under `met`.
    pub fn depends_on(&self, id: &str, met: impl Fn(&str) -> bool) -> bool {
        if self.is_empty() {
            return false;
        }
        match self {
            Prerequisites::All(ids) => ids.iter().any(|p| p == id),
            Prerequisites::AnyOf(groups) => groups.iter().all(|group| {
                group.iter().any(|p| p == id) || !group.iter().all(|p| met(p.as_str()))
            }),
        }
    }
}

/// One skill node. Geometry fields from the editor (x, y, radius, svgId)
/// are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tree: TreeId,
    #[serde(default)]
    pub tier: u32,
    #[serde(default)]
    pub prerequisites: Prerequisites,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_required_in_tree: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub is_key_node: bool,
}

impl SkillNode {
    /// Cap on points this node may hold (default 1).
    pub fn max_points(&self) -> u32 {
        self.max_points.unwrap_or(1)
    }

    /// Points that must be spent earlier in the tree before the first point here.
    pub fn gate(&self) -> u32 {
        self.points_required_in_tree.unwrap_or(0)
    }
}

/// Rendering edge between two nodes of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPath {
    #[serde(default)]
    pub id: String,
    pub from: String,
    pub to: String,
    pub tree: TreeId,
}

/// Display settings of one tree, editable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSettings {
    pub name: String,
    pub color: String,
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct TreeConfig {
    id: TreeId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: String,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    nodes: Vec<SkillNode>,
    #[serde(default)]
    paths: Vec<SkillPath>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillTreeConfig {
    #[serde(default)]
    version: String,
    #[serde(default)]
    max_skill_points: u32,
    #[serde(default)]
    trees: BTreeMap<TreeId, TreeConfig>,
}

/// Partial node fields supplied by the tree editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tier: Option<u32>,
    #[serde(default)]
    pub prerequisites: Option<Prerequisites>,
    #[serde(default)]
    pub max_points: Option<u32>,
    #[serde(default)]
    pub points_required_in_tree: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub icon_path: Option<String>,
}

/// Editor overrides: tree display settings and per-node field patches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOverrides {
    #[serde(default)]
    pub trees: BTreeMap<TreeId, TreeSettings>,
    #[serde(default)]
    pub node_overrides: HashMap<String, NodeOverride>,
}

/// Read-only catalog for one mode.
#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,
    max_skill_points: u32,
    trees: BTreeMap<TreeId, TreeSettings>,
    nodes: Vec<SkillNode>,
    paths: Vec<SkillPath>,
    index: HashMap<String, usize>,
}

impl Default for Catalog {
    /// Empty catalog with the stock tree names, used as a load fallback.
    fn default() -> Self {
        let trees = TreeId::ALL
            .iter()
            .map(|&tree| {
                let color = if tree == TreeId::A { "#10b981" } else { "#22c55e" };
                (
                    tree,
                    TreeSettings {
                        name: format!("Tree {}", tree),
                        color: color.to_string(),
                        visible: true,
                    },
                )
            })
            .collect();
        Self {
            version: "1.0.0".to_string(),
            max_skill_points: DEFAULT_MAX_SKILL_POINTS,
            trees,
            nodes: Vec::new(),
            paths: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl Catalog {
    /// Load the catalog compiled in for `mode`.
    pub fn embedded(mode: ConfigMode) -> Result<Catalog> {
        match mode {
            ConfigMode::Main => Catalog::from_json(MAIN_CONFIG_JSON),
            ConfigMode::Proto => Catalog::from_json(PROTO_CONFIG_JSON),
        }
    }

    /// Parse and validate a `skill_tree_config.json` document.
    pub fn from_json(json: &str) -> Result<Catalog> {
        let config: SkillTreeConfig = serde_json::from_str(json)?;
        Catalog::from_config(config)
    }

    fn from_config(mut config: SkillTreeConfig) -> Result<Catalog> {
        if config.version.trim().is_empty() {
            return Err(Error::MissingVersion);
        }
        if config.max_skill_points < 1 {
            return Err(Error::InvalidMaxSkillPoints(config.max_skill_points));
        }

        let mut trees = BTreeMap::new();
        let mut nodes = Vec::new();
        let mut paths = Vec::new();
        let mut index = HashMap::new();

        for tree_id in TreeId::ALL {
            let tree = config
                .trees
                .remove(&tree_id)
                .ok_or(Error::MissingTree(tree_id))?;
            if tree.id != tree_id || tree.name.trim().is_empty() {
                return Err(Error::IncompleteTree(tree_id));
            }

            for node in tree.nodes {
                if node.id.is_empty() || node.tree != tree_id || node.max_points == Some(0) {
                    return Err(Error::InvalidNode {
                        tree: tree_id,
                        id: node.id,
                    });
                }
                if index.insert(node.id.clone(), nodes.len()).is_some() {
                    return Err(Error::DuplicateNode(node.id));
                }
                nodes.push(node);
            }
            paths.extend(tree.paths);
            trees.insert(
                tree_id,
                TreeSettings {
                    name: tree.name,
                    color: tree.color,
                    visible: tree.visible,
                },
            );
        }

        let catalog = Catalog {
            version: config.version,
            max_skill_points: config.max_skill_points,
            trees,
            nodes,
            paths,
            index,
        };
        catalog.warn_dangling_prerequisites();
        Ok(catalog)
    }

    fn warn_dangling_prerequisites(&self) {
        for node in &self.nodes {
            for prereq in node.prerequisites.ids() {
                if !self.contains(prereq) {
                    tracing::warn!("Node {} names unknown prerequisite {}", node.id, prereq);
                }
            }
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The catalog's own per-build point budget.
    pub fn max_skill_points(&self) -> u32 {
        self.max_skill_points
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&SkillNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Catalog index of `id` in the flattened A..D node order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node_at(&self, index: usize) -> Option<&SkillNode> {
        self.nodes.get(index)
    }

    /// All nodes in catalog-index order.
    pub fn nodes(&self) -> &[SkillNode] {
        &self.nodes
    }

    pub fn tree_nodes(&self, tree: TreeId) -> impl Iterator<Item = &SkillNode> {
        self.nodes.iter().filter(move |n| n.tree == tree)
    }

    pub fn tree_paths(&self, tree: TreeId) -> impl Iterator<Item = &SkillPath> {
        self.paths.iter().filter(move |p| p.tree == tree)
    }

    pub fn tree_settings(&self, tree: TreeId) -> Option<&TreeSettings> {
        self.trees.get(&tree)
    }

    pub fn trees(&self) -> &BTreeMap<TreeId, TreeSettings> {
        &self.trees
    }

    pub fn visible_trees(&self) -> Vec<TreeId> {
        self.trees
            .iter()
            .filter(|(_, t)| t.visible)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Patch tree settings and node fields in place. Ids and order never
    /// change, so catalog indices stay stable. Unknown node ids are skipped.
    pub fn apply_overrides(&mut self, overrides: &CatalogOverrides) {
        for (tree, settings) in &overrides.trees {
            self.trees.insert(*tree, settings.clone());
        }

        for (id, patch) in &overrides.node_overrides {
            let Some(&i) = self.index.get(id) else {
                tracing::warn!("Override for unknown node {} ignored", id);
                continue;
            };
            let node = &mut self.nodes[i];
            if let Some(name) = &patch.name {
                node.name = name.clone();
            }
            if let Some(description) = &patch.description {
                node.description = description.clone();
            }
            if let Some(tier) = patch.tier {
                node.tier = tier;
            }
            if let Some(prerequisites) = &patch.prerequisites {
                node.prerequisites = prerequisites.clone();
            }
            if let Some(max) = patch.max_points {
                node.max_points = Some(max.max(1));
            }
            if let Some(gate) = patch.points_required_in_tree {
                node.points_required_in_tree = Some(gate);
            }
            if let Some(comment) = &patch.comment {
                node.comment = Some(comment.clone());
            }
            if let Some(icon) = &patch.icon_path {
                node.icon_path = Some(icon.clone());
            }
        }
    }

    /// Test helper: a catalog from nodes alone, default trees, given budget.
    #[cfg(test)]
    pub(crate) fn from_nodes(nodes: Vec<SkillNode>, max_skill_points: u32) -> Catalog {
        let mut catalog = Catalog {
            max_skill_points,
            ..Catalog::default()
        };
        for tree in TreeId::ALL {
            for node in nodes.iter().filter(|n| n.tree == tree) {
                catalog.index.insert(node.id.clone(), catalog.nodes.len());
                catalog.nodes.push(node.clone());
            }
        }
        catalog
    }
}

/// Test helper for building nodes tersely.
#[cfg(test)]
pub(crate) fn test_node(
    id: &str,
    tree: TreeId,
    tier: u32,
    prerequisites: Prerequisites,
    max_points: u32,
    gate: u32,
) -> SkillNode {
    SkillNode {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        tree,
        tier,
        prerequisites,
        max_points: Some(max_points),
        points_required_in_tree: Some(gate),
        comment: None,
        icon_path: None,
        is_key_node: false,
    }
}

#[cfg(test)]
pub(crate) fn all(ids: &[&str]) -> Prerequisites {
    Prerequisites::All(ids.iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
pub(crate) fn any_of(groups: &[&[&str]]) -> Prerequisites {
    Prerequisites::AnyOf(
        groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect(),
    )
}
