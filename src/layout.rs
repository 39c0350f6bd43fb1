//! Layout engine – builds a Taffy tree from the styled DOM and flattens the
//! result into a parent-linked [`BoxTree`].
//!
//! Boxes keep positions relative to their parent, exactly as Taffy reports
//! them. Absolute positions are recovered by walking the ancestor chain.

use std::collections::HashMap;

use taffy::prelude::{
    AvailableSpace, Dimension as TaffyDimension, LengthPercentage, LengthPercentageAuto, NodeId as TaffyNodeId,
    Rect, Size, Style, TaffyTree,
};
use thiserror::Error;

use crate::dom::{NodeId, Tag};
use crate::fonts::{wrap_text, FontManager};
use crate::raster::decode_data_uri;
use crate::style::{ComputedStyle, Dimension, Display, FlexDirection, RegionMarkers, StyledNode};

/// What a laid-out box paints besides its background and border.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxContent {
    None,
    Text { lines: Vec<String> },
    Image { src: String },
    Spacer,
}

/// One box of the laid-out segment, in CSS pixels.
#[derive(Debug, Clone)]
pub struct LaidOutBox {
    /// Source element; `None` for the root and for anonymous text runs.
    pub node: Option<NodeId>,
    /// Index of the parent box in the owning [`BoxTree`].
    pub parent: Option<usize>,
    /// Offset from the parent's top-left corner.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub markers: RegionMarkers,
}

/// Laid-out boxes in pre-order; parents always precede their children.
#[derive(Debug, Clone, Default)]
pub struct BoxTree {
    boxes: Vec<LaidOutBox>,
}

impl BoxTree {
    pub fn boxes(&self) -> &[LaidOutBox] {
        &self.boxes
    }

    /// Natural content height of the segment.
    pub fn height(&self) -> f32 {
        self.boxes.first().map(|root| root.height).unwrap_or(0.0)
    }

    /// Absolute top-left of box `index`: the sum of its own offset and the
    /// offsets of every ancestor up to the root.
    pub fn absolute_origin(&self, index: usize) -> (f32, f32) {
        let mut x = 0.0;
        let mut y = 0.0;
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let b = &self.boxes[i];
            x += b.x;
            y += b.y;
            cursor = b.parent;
        }
        (x, y)
    }
}

/// Failure inside the Taffy layout pass.
#[derive(Debug, Error)]
#[error("taffy: {0}")]
pub struct LayoutError(#[from] taffy::TaffyError);

/// Per-Taffy-node data needed after layout.
struct NodeInfo {
    node: Option<NodeId>,
    style: ComputedStyle,
    content: BoxContent,
    markers: RegionMarkers,
}

struct LayoutBuilder<'a> {
    taffy: &'a mut TaffyTree<()>,
    fonts: &'a FontManager,
    info: HashMap<TaffyNodeId, NodeInfo>,
}

type LayoutResult<T> = Result<T, LayoutError>;

impl<'a> LayoutBuilder<'a> {
    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> LayoutResult<TaffyNodeId> {
        match styled {
            StyledNode::Text { text, style } => {
                let text = normalize_whitespace(text);
                self.build_text_leaf(&text, style, None, RegionMarkers::default(), parent_width)
            }
            StyledNode::Element {
                id,
                tag,
                style,
                markers,
                children,
                attrs,
            } => {
                if *tag == Tag::Spacer {
                    return self.build_spacer(*id, style);
                }
                if *tag == Tag::Img {
                    let src = attrs.get("src").cloned().unwrap_or_default();
                    return self.build_image(*id, style, *markers, src, parent_width);
                }
                if !children.is_empty() && children.iter().all(is_inline) {
                    let text = normalize_whitespace(&children.iter().map(collect_inline_text).collect::<String>());
                    if !text.is_empty() {
                        let leaf = self.build_text_leaf(&text, style, Some(*id), *markers, parent_width)?;
                        self.apply_tag_rules(leaf, tag, *markers)?;
                        return Ok(leaf);
                    }
                }
                self.build_container(*id, tag, style, *markers, children, parent_width)
            }
        }
    }

    fn build_text_leaf(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        node: Option<NodeId>,
        markers: RegionMarkers,
        parent_width: f32,
    ) -> LayoutResult<TaffyNodeId> {
        let outer = resolve_width(style.width, parent_width);
        let inner = (outer - horizontal_insets(style)).max(1.0);
        let bold = style.is_bold();
        let lines = wrap_text(text, style.font_size, bold, inner, self.fonts);
        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, style.font_size, bold))
            .fold(0.0f32, f32::max)
            .min(inner);
        let text_height = lines.len() as f32 * self.fonts.line_height_px(style.font_size, style.line_height);

        let mut ts = box_style(style);
        ts.min_size = Size {
            width: TaffyDimension::Length(text_width + horizontal_insets(style)),
            height: TaffyDimension::Length(text_height + vertical_insets(style)),
        };
        ts.flex_shrink = 0.0;
        let id = self.taffy.new_leaf(ts)?;
        self.info.insert(
            id,
            NodeInfo {
                node,
                style: style.clone(),
                content: BoxContent::Text { lines },
                markers,
            },
        );
        Ok(id)
    }

    fn build_spacer(&mut self, node: NodeId, style: &ComputedStyle) -> LayoutResult<TaffyNodeId> {
        let height = match style.height {
            Dimension::Px(h) => h,
            _ => 0.0,
        };
        let ts = Style {
            size: Size {
                width: TaffyDimension::Percent(1.0),
                height: TaffyDimension::Length(height),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };
        let id = self.taffy.new_leaf(ts)?;
        self.info.insert(
            id,
            NodeInfo {
                node: Some(node),
                style: style.clone(),
                content: BoxContent::Spacer,
                markers: RegionMarkers::default(),
            },
        );
        Ok(id)
    }

    fn build_image(
        &mut self,
        node: NodeId,
        style: &ComputedStyle,
        markers: RegionMarkers,
        src: String,
        parent_width: f32,
    ) -> LayoutResult<TaffyNodeId> {
        let mut resolved = style.clone();
        if let Some((w, h)) = intrinsic_image_size(&src, style, parent_width) {
            resolved.width = Dimension::Px(w);
            resolved.height = Dimension::Px(h);
        }
        let mut ts = box_style(&resolved);
        ts.flex_shrink = 0.0;
        let id = self.taffy.new_leaf(ts)?;
        self.info.insert(
            id,
            NodeInfo {
                node: Some(node),
                style: resolved,
                content: BoxContent::Image { src },
                markers,
            },
        );
        Ok(id)
    }

    fn build_container(
        &mut self,
        node: NodeId,
        tag: &Tag,
        style: &ComputedStyle,
        markers: RegionMarkers,
        children: &[StyledNode],
        parent_width: f32,
    ) -> LayoutResult<TaffyNodeId> {
        let outer = resolve_width(style.width, parent_width);
        let inner = (outer - horizontal_insets(style)).max(1.0);

        // Row containers split their width evenly so text wraps per column.
        let is_row = style.display == Display::Flex && style.flex_direction == FlexDirection::Row;
        let child_width = if is_row {
            let count = children.len().max(1);
            ((inner - style.gap * (count - 1) as f32) / count as f32).max(1.0)
        } else {
            inner
        };

        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            let child_id = self.build_node(child, child_width)?;
            if is_spacer(child) && style.gap > 0.0 {
                self.cancel_gap(child_id, style.gap, is_row)?;
            }
            child_ids.push(child_id);
        }

        let id = self
            .taffy
            .new_with_children(box_style(style), &child_ids)
            ?;
        self.apply_tag_rules(id, tag, markers)?;
        self.info.insert(
            id,
            NodeInfo {
                node: Some(node),
                style: style.clone(),
                content: BoxContent::None,
                markers,
            },
        );
        Ok(id)
    }

    /// A spacer adds one more gap to its parent's flow; a negative leading
    /// margin of the same size takes it back, so the spacer shifts its
    /// following siblings by exactly its own height.
    fn cancel_gap(&mut self, id: TaffyNodeId, gap: f32, is_row: bool) -> LayoutResult<()> {
        let mut ts = self.taffy.style(id)?.clone();
        if is_row {
            ts.margin.left = LengthPercentageAuto::Length(-gap);
        } else {
            ts.margin.top = LengthPercentageAuto::Length(-gap);
        }
        self.taffy.set_style(id, ts)?;
        Ok(())
    }

    /// Table cells share their row evenly; rows and protected blocks never
    /// shrink.
    fn apply_tag_rules(&mut self, id: TaffyNodeId, tag: &Tag, markers: RegionMarkers) -> LayoutResult<()> {
        let mut ts = self.taffy.style(id)?.clone();
        if matches!(tag, Tag::Td | Tag::Th) {
            ts.flex_grow = 1.0;
            ts.flex_basis = TaffyDimension::Length(0.0);
            ts.min_size.width = TaffyDimension::Length(0.0);
        }
        if *tag == Tag::Tr || markers.avoid_split || markers.forced_break {
            ts.flex_shrink = 0.0;
        }
        self.taffy.set_style(id, ts)?;
        Ok(())
    }

    fn extract(&self, node: TaffyNodeId, parent: Option<usize>, out: &mut Vec<LaidOutBox>) -> LayoutResult<()> {
        let layout = self.taffy.layout(node)?;
        let (source, style, content, markers) = match self.info.get(&node) {
            Some(info) => (info.node, info.style.clone(), info.content.clone(), info.markers),
            None => (None, ComputedStyle::default(), BoxContent::None, RegionMarkers::default()),
        };
        let index = out.len();
        out.push(LaidOutBox {
            node: source,
            parent,
            x: layout.location.x,
            y: layout.location.y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            markers,
        });
        for child in self.taffy.children(node)? {
            self.extract(child, Some(index), out)?;
        }
        Ok(())
    }
}

fn is_spacer(node: &StyledNode) -> bool {
    matches!(node, StyledNode::Element { tag: Tag::Spacer, .. })
}

fn is_inline(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element { tag, style, children, .. } => {
            style.display == Display::Inline && tag.is_inline() && children.iter().all(is_inline)
        }
    }
}

fn collect_inline_text(node: &StyledNode) -> String {
    match node {
        StyledNode::Text { text, .. } => text.clone(),
        StyledNode::Element { tag: Tag::Br, .. } => "\n".to_string(),
        StyledNode::Element { children, .. } => children.iter().map(collect_inline_text).collect(),
    }
}

/// Collapse whitespace runs per line, keeping explicit line breaks.
fn normalize_whitespace(text: &str) -> String {
    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn resolve_width(width: Dimension, parent_width: f32) -> f32 {
    match width {
        Dimension::Px(w) => w,
        Dimension::Percent(p) => parent_width * p,
        Dimension::Auto => parent_width,
    }
}

fn horizontal_insets(s: &ComputedStyle) -> f32 {
    s.padding_left + s.padding_right + 2.0 * s.border_width
}

fn vertical_insets(s: &ComputedStyle) -> f32 {
    s.padding_top + s.padding_bottom + 2.0 * s.border_width
}

fn to_taffy_dimension(d: Dimension) -> TaffyDimension {
    match d {
        Dimension::Auto => TaffyDimension::Auto,
        Dimension::Px(v) => TaffyDimension::Length(v),
        Dimension::Percent(v) => TaffyDimension::Percent(v),
    }
}

/// Box model shared by every node: flex container, sizes, spacing, border.
fn box_style(s: &ComputedStyle) -> Style {
    let flex_direction = match (s.display, s.flex_direction) {
        (Display::Flex, FlexDirection::Row) => taffy::FlexDirection::Row,
        _ => taffy::FlexDirection::Column,
    };
    Style {
        display: taffy::Display::Flex,
        flex_direction,
        size: Size {
            width: to_taffy_dimension(s.width),
            height: to_taffy_dimension(s.height),
        },
        min_size: Size {
            width: TaffyDimension::Auto,
            height: to_taffy_dimension(s.min_height),
        },
        margin: Rect {
            top: LengthPercentageAuto::Length(s.margin_top),
            right: LengthPercentageAuto::Length(s.margin_right),
            bottom: LengthPercentageAuto::Length(s.margin_bottom),
            left: LengthPercentageAuto::Length(s.margin_left),
        },
        padding: Rect {
            top: LengthPercentage::Length(s.padding_top),
            right: LengthPercentage::Length(s.padding_right),
            bottom: LengthPercentage::Length(s.padding_bottom),
            left: LengthPercentage::Length(s.padding_left),
        },
        border: Rect {
            top: LengthPercentage::Length(s.border_width),
            right: LengthPercentage::Length(s.border_width),
            bottom: LengthPercentage::Length(s.border_width),
            left: LengthPercentage::Length(s.border_width),
        },
        gap: Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        },
        ..Default::default()
    }
}

/// Concrete width/height for an `<img>`, filling any `auto` axis from the
/// intrinsic size of a base64 data-URI image. `None` when nothing is known.
fn intrinsic_image_size(src: &str, style: &ComputedStyle, parent_width: f32) -> Option<(f32, f32)> {
    let known_w = match style.width {
        Dimension::Px(v) => Some(v),
        Dimension::Percent(p) => Some(parent_width * p),
        Dimension::Auto => None,
    };
    let known_h = match style.height {
        Dimension::Px(v) => Some(v),
        _ => None,
    };
    if let (Some(w), Some(h)) = (known_w, known_h) {
        return Some((w, h));
    }

    let bytes = decode_data_uri(src).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;
    let size = match (known_w, known_h) {
        (Some(w), None) => (w, (w / aspect).max(1.0)),
        (None, Some(h)) => ((h * aspect).max(1.0), h),
        _ => (px_w.min(parent_width), px_w.min(parent_width) / aspect),
    };
    Some(size)
}

/// Lay out a styled segment at `viewport_width` CSS pixels.
///
/// `taffy` is scratch space; it is cleared before use. Layout is kept at
/// sub-pixel precision so inserted spacers shift content by exactly their
/// height.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    viewport_width: f32,
    fonts: &FontManager,
    taffy: &mut TaffyTree<()>,
) -> Result<BoxTree, LayoutError> {
    taffy.clear();
    taffy.disable_rounding();
    let mut builder = LayoutBuilder {
        taffy,
        fonts,
        info: HashMap::new(),
    };

    let mut child_ids = Vec::with_capacity(styled_nodes.len());
    for node in styled_nodes {
        child_ids.push(builder.build_node(node, viewport_width)?);
    }

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: TaffyDimension::Length(viewport_width),
            height: TaffyDimension::Auto,
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        ?;
    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(viewport_width),
                height: AvailableSpace::MaxContent,
            },
        )
        ?;

    let mut boxes = Vec::new();
    builder.extract(root, None, &mut boxes)?;
    Ok(BoxTree { boxes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Markup;
    use crate::style::build_styled_tree;

    fn layout(html: &str, width: f32) -> BoxTree {
        let markup = Markup::parse(html);
        let styled = build_styled_tree(markup.nodes(), None);
        let mut taffy = TaffyTree::new();
        compute_layout(&styled, width, &FontManager::default(), &mut taffy).unwrap()
    }

    fn find(tree: &BoxTree, id: u32) -> usize {
        tree.boxes()
            .iter()
            .position(|b| b.node == Some(NodeId(id)))
            .expect("box for node")
    }

    #[test]
    fn fixed_height_blocks_stack() {
        let tree = layout(
            r#"<div style="height:100px"></div><div style="height:50px"></div>"#,
            400.0,
        );
        assert_eq!(tree.height(), 150.0);
        let second = find(&tree, 1);
        assert_eq!(tree.absolute_origin(second), (0.0, 100.0));
        assert_eq!(tree.boxes()[second].height, 50.0);
    }

    #[test]
    fn nested_offsets_sum_over_ancestors() {
        let tree = layout(
            r#"<div style="height:40px"></div>
               <div style="padding-top:10px">
                 <div style="height:30px"></div>
                 <div id="inner" style="height:20px"></div>
               </div>"#,
            400.0,
        );
        let inner = find(&tree, 3);
        // 40 (first block) + 10 (padding) + 30 (sibling)
        assert_eq!(tree.absolute_origin(inner).1, 80.0);
        // Relative to its parent it is only 10 + 30.
        assert_eq!(tree.boxes()[inner].y, 40.0);
    }

    #[test]
    fn paragraph_text_wraps_into_lines() {
        let tree = layout("<p>one two three four five six seven eight</p>", 100.0);
        let p = find(&tree, 0);
        let BoxContent::Text { lines } = &tree.boxes()[p].content else {
            panic!("Expected text content");
        };
        assert!(lines.len() > 1, "Expected wrapping, got {lines:?}");
        // 16px × 1.4 per line
        assert!((tree.boxes()[p].height - lines.len() as f32 * 22.4).abs() < 0.01);
    }

    #[test]
    fn table_rows_are_full_width_and_stack() {
        let tree = layout(
            "<table><tbody>\
             <tr><td style=\"height:30px\">a</td><td>b</td></tr>\
             <tr><td>c</td><td>d</td></tr>\
             </tbody></table>",
            300.0,
        );
        let row1 = find(&tree, 2);
        let row2 = find(&tree, 5);
        assert!(tree.boxes()[row1].markers.table_body_row);
        assert_eq!(tree.boxes()[row1].width, 300.0);
        assert!(tree.absolute_origin(row2).1 >= 30.0);
    }

    #[test]
    fn spacer_has_its_declared_height() {
        let mut markup = Markup::parse(r#"<div style="height:10px"></div><div style="height:10px"></div>"#);
        assert!(markup.insert_spacer_before(NodeId(1), 25.0));
        let styled = build_styled_tree(markup.nodes(), None);
        let mut taffy = TaffyTree::new();
        let tree = compute_layout(&styled, 200.0, &FontManager::default(), &mut taffy).unwrap();
        assert_eq!(tree.height(), 45.0);
        let second = find(&tree, 1);
        assert_eq!(tree.absolute_origin(second).1, 35.0);
    }

    #[test]
    fn spacer_in_gapped_column_shifts_by_its_height_only() {
        let html = r#"<div style="display:flex;flex-direction:column;gap:10px">
                        <div style="height:10px"></div>
                        <div style="height:10px"></div>
                      </div>"#;
        let plain = layout(html, 200.0);
        assert_eq!(plain.absolute_origin(find(&plain, 2)).1, 20.0);

        for anchor in [1, 2] {
            let mut markup = Markup::parse(html);
            assert!(markup.insert_spacer_before(NodeId(anchor), 25.0));
            let styled = build_styled_tree(markup.nodes(), None);
            let mut taffy = TaffyTree::new();
            let tree = compute_layout(&styled, 200.0, &FontManager::default(), &mut taffy).unwrap();
            let first = find(&tree, 1);
            let second = find(&tree, 2);
            let expected_first = if anchor == 1 { 25.0 } else { 0.0 };
            assert_eq!(tree.absolute_origin(first).1, expected_first);
            assert_eq!(tree.absolute_origin(second).1, 45.0);
            assert_eq!(tree.height(), 55.0);
        }
    }
}
