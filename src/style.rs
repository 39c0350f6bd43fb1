//! Style resolver – maps inline CSS and a handful of utility classes onto a
//! flat [`ComputedStyle`], and tags elements with the pagination markers the
//! region scanner looks for.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, NodeId, Tag};

/// CSS pixels per millimetre at 96dpi.
const PX_PER_MM: f32 = 96.0 / 25.4;
/// CSS pixels per point.
const PX_PER_PT: f32 = 96.0 / 72.0;

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub gap: f32,

    pub width: Dimension,
    pub height: Dimension,
    pub min_height: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    pub border_width: f32,
    pub border_color: Color,

    // Typography (inherited)
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,

    pub background_color: Color,

    /// `page-break-before: always` and friends.
    pub break_before: bool,
    /// `page-break-inside: avoid` and friends.
    pub avoid_break_inside: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            background_color: Color::TRANSPARENT,
            break_before: false,
            avoid_break_inside: false,
        }
    }
}

impl ComputedStyle {
    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    /// Copy of this style for a text run: inherited typography only.
    fn for_text(&self) -> Self {
        Self {
            font_size: self.font_size,
            font_weight: self.font_weight,
            color: self.color,
            text_align: self.text_align,
            line_height: self.line_height,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    /// Fraction of the parent, 0.0 – 1.0.
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// `#hex`, `rgb()/rgba()` or a few named colours.
    pub fn parse(val: &str) -> Option<Self> {
        let val = val.trim();
        if val.starts_with('#') {
            return Self::from_hex(val);
        }
        if let Some(args) = val
            .strip_prefix("rgba(")
            .or_else(|| val.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            return match parts.as_slice() {
                [r, g, b] => Some(Self::rgb(r / 255.0, g / 255.0, b / 255.0)),
                [r, g, b, a] => Some(Self {
                    r: r / 255.0,
                    g: g / 255.0,
                    b: b / 255.0,
                    a: *a,
                }),
                _ => None,
            };
        }
        match val.to_ascii_lowercase().as_str() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "red" => Some(Self::rgb(1.0, 0.0, 0.0)),
            "green" => Some(Self::rgb(0.0, 0.5, 0.0)),
            "blue" => Some(Self::rgb(0.0, 0.0, 1.0)),
            "gray" | "grey" => Some(Self::rgb(0.5, 0.5, 0.5)),
            "transparent" => Some(Self::TRANSPARENT),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting typography from its parent.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        style.font_size = p.font_size;
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
        if style.font_weight == FontWeight::Normal {
            style.font_weight = p.font_weight;
        }
    }
    apply_heading_size(&element.tag, &mut style);

    for class in element.classes() {
        apply_class(&mut style, class);
    }
    if element.attributes.contains_key("data-avoid-split") {
        style.avoid_break_inside = true;
    }
    if element.attr("data-page-break") == Some("before") {
        style.break_before = true;
    }
    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }
    if let Some(h) = element.spacer_height() {
        style.height = Dimension::Px(h);
    }
    style
}

fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    match tag {
        Tag::H1 | Tag::H2 | Tag::H3 => {
            s.font_weight = FontWeight::Bold;
        }
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.margin_bottom = 4.0;
        }
        Tag::Table | Tag::Thead | Tag::Tbody => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Column;
            s.width = Dimension::Percent(1.0);
        }
        Tag::Tr => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Row;
            s.width = Dimension::Percent(1.0);
        }
        Tag::Td | Tag::Th => {
            s.padding_top = 4.0;
            s.padding_right = 8.0;
            s.padding_bottom = 4.0;
            s.padding_left = 8.0;
            s.border_width = 1.0;
            s.border_color = Color::rgb(0.82, 0.84, 0.86);
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(0.95, 0.96, 0.96);
            }
        }
        Tag::Span | Tag::Em | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Strong => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Spacer => {
            s.width = Dimension::Percent(1.0);
        }
        Tag::Head => {
            s.display = Display::None;
        }
        Tag::Div
        | Tag::Section
        | Tag::Article
        | Tag::Header
        | Tag::Footer
        | Tag::Img
        | Tag::Body
        | Tag::Html
        | Tag::Unknown(_) => {}
    }
    s
}

fn apply_heading_size(tag: &Tag, s: &mut ComputedStyle) {
    let (size, top, bottom) = match tag {
        Tag::H1 => (32.0, 16.0, 12.0),
        Tag::H2 => (24.0, 14.0, 10.0),
        Tag::H3 => (20.0, 12.0, 8.0),
        _ => return,
    };
    s.font_size = size;
    s.margin_top = top;
    s.margin_bottom = bottom;
}

/// Utility classes: pagination markers plus a small Tailwind-like subset.
fn apply_class(s: &mut ComputedStyle, class: &str) {
    match class {
        "avoid-break" | "no-split" | "break-inside-avoid" => s.avoid_break_inside = true,
        "page-break-before" | "break-before" | "break-before-page" => s.break_before = true,
        "flex" => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Row;
        }
        "flex-col" => {
            s.display = Display::Flex;
            s.flex_direction = FlexDirection::Column;
        }
        "hidden" => s.display = Display::None,
        "w-full" => s.width = Dimension::Percent(1.0),
        "font-bold" => s.font_weight = FontWeight::Bold,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-xs" => s.font_size = 12.0,
        "text-sm" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "text-3xl" => s.font_size = 30.0,
        _ => apply_spacing_class(s, class),
    }
}

/// `p-4`, `mb-2`, `gap-3`, ... on a 4px scale.
fn apply_spacing_class(s: &mut ComputedStyle, class: &str) {
    let Some((prefix, value)) = class.split_once('-') else {
        return;
    };
    let Ok(steps) = value.parse::<f32>() else {
        return;
    };
    let px = steps * 4.0;
    match prefix {
        "p" => {
            s.padding_top = px;
            s.padding_right = px;
            s.padding_bottom = px;
            s.padding_left = px;
        }
        "px" => {
            s.padding_left = px;
            s.padding_right = px;
        }
        "py" => {
            s.padding_top = px;
            s.padding_bottom = px;
        }
        "pt" => s.padding_top = px,
        "pb" => s.padding_bottom = px,
        "m" => {
            s.margin_top = px;
            s.margin_right = px;
            s.margin_bottom = px;
            s.margin_left = px;
        }
        "my" => {
            s.margin_top = px;
            s.margin_bottom = px;
        }
        "mt" => s.margin_top = px,
        "mb" => s.margin_bottom = px,
        "gap" => s.gap = px,
        _ => {}
    }
}

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        let Some((prop, val)) = decl.split_once(':') else {
            continue;
        };
        let prop = prop.trim().to_ascii_lowercase();
        let val = val.trim().trim_end_matches("!important").trim();
        apply_css_property(s, &prop, val);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    let font_size = s.font_size;
    let length = |v: &str| parse_length(v, font_size);
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" | "inline-block" | "list-item" => Display::Block,
                "inline" => Display::Inline,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "column" => FlexDirection::Column,
                _ => FlexDirection::Row,
            }
        }
        "gap" => {
            if let Some(px) = length(val) {
                s.gap = px;
            }
        }
        "width" | "max-width" => s.width = parse_dimension(val, font_size),
        "height" => s.height = parse_dimension(val, font_size),
        "min-height" => s.min_height = parse_dimension(val, font_size),
        "margin" => apply_box_shorthand(
            val,
            font_size,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_length(&mut s.margin_top, length(val)),
        "margin-right" => set_length(&mut s.margin_right, length(val)),
        "margin-bottom" => set_length(&mut s.margin_bottom, length(val)),
        "margin-left" => set_length(&mut s.margin_left, length(val)),
        "padding" => apply_box_shorthand(
            val,
            font_size,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_length(&mut s.padding_top, length(val)),
        "padding-right" => set_length(&mut s.padding_right, length(val)),
        "padding-bottom" => set_length(&mut s.padding_bottom, length(val)),
        "padding-left" => set_length(&mut s.padding_left, length(val)),
        "border" => {
            for part in val.split_whitespace() {
                if let Some(px) = length(part) {
                    s.border_width = px;
                } else if let Some(c) = Color::parse(part) {
                    s.border_color = c;
                } else if part == "none" {
                    s.border_width = 0.0;
                }
            }
        }
        "border-width" => set_length(&mut s.border_width, length(val)),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "font-size" => set_length(&mut s.font_size, length(val)),
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "line-height" => {
            if let Ok(factor) = val.parse::<f32>() {
                s.line_height = factor;
            } else if let Some(px) = length(val) {
                s.line_height = px / s.font_size.max(1.0);
            }
        }
        "page-break-before" | "break-before" => {
            s.break_before = matches!(val, "always" | "page");
        }
        "page-break-inside" | "break-inside" => {
            s.avoid_break_inside = matches!(val, "avoid" | "avoid-page");
        }
        _ => {}
    }
}

fn set_length(slot: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        *slot = v;
    }
}

/// Length in CSS pixels: `px`, `pt`, `mm`, `em` or a bare number.
pub fn parse_length(val: &str, font_size: f32) -> Option<f32> {
    let val = val.trim();
    let (number, factor) = if let Some(n) = val.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = val.strip_suffix("pt") {
        (n, PX_PER_PT)
    } else if let Some(n) = val.strip_suffix("mm") {
        (n, PX_PER_MM)
    } else if let Some(n) = val.strip_suffix("rem") {
        (n, 16.0)
    } else if let Some(n) = val.strip_suffix("em") {
        (n, font_size)
    } else {
        (val, 1.0)
    };
    number.trim().parse::<f32>().ok().map(|n| n * factor)
}

fn parse_dimension(val: &str, font_size: f32) -> Dimension {
    let val = val.trim();
    if let Some(pct) = val.strip_suffix('%') {
        return pct
            .trim()
            .parse::<f32>()
            .map(|p| Dimension::Percent(p / 100.0))
            .unwrap_or(Dimension::Auto);
    }
    parse_length(val, font_size)
        .map(Dimension::Px)
        .unwrap_or(Dimension::Auto)
}

/// CSS box shorthand with 1 to 4 values.
fn apply_box_shorthand(val: &str, font_size: f32, [top, right, bottom, left]: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .map(|p| if p == "auto" { Some(0.0) } else { parse_length(p, font_size) })
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();
    let (t, r, b, l) = match parts.as_slice() {
        [a] => (*a, *a, *a, *a),
        [v, h] => (*v, *h, *v, *h),
        [t, h, b] => (*t, *h, *b, *h),
        [t, r, b, l] => (*t, *r, *b, *l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// Pagination markers attached to an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionMarkers {
    pub forced_break: bool,
    pub avoid_split: bool,
    pub table_body_row: bool,
}

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        id: NodeId,
        tag: Tag,
        style: ComputedStyle,
        markers: RegionMarkers,
        children: Vec<StyledNode>,
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Where an element sits relative to table sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableContext {
    Outside,
    Table,
    Head,
    Body,
}

/// Build a styled tree from the DOM, resolving styles top-down.
pub fn build_styled_tree(nodes: &[DomNode], parent_style: Option<&ComputedStyle>) -> Vec<StyledNode> {
    build_nodes(nodes, parent_style, TableContext::Outside)
}

fn build_nodes(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
    context: TableContext,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                if style.display == Display::None {
                    continue;
                }
                let child_context = match e.tag {
                    Tag::Table => TableContext::Table,
                    Tag::Thead => TableContext::Head,
                    Tag::Tbody => TableContext::Body,
                    Tag::Tr | Tag::Td | Tag::Th => context,
                    _ => TableContext::Outside,
                };
                let markers = RegionMarkers {
                    forced_break: style.break_before,
                    avoid_split: style.avoid_break_inside,
                    table_body_row: e.tag == Tag::Tr && is_body_row(e, context),
                };
                let children = build_nodes(&e.children, Some(&style), child_context);
                result.push(StyledNode::Element {
                    id: e.id,
                    tag: e.tag.clone(),
                    style,
                    markers,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.trim().is_empty() {
                    let style = parent_style.map(ComputedStyle::for_text).unwrap_or_default();
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style,
                    });
                }
            }
        }
    }
    result
}

/// Rows of a `<tbody>`, or rows placed straight in `<table>` that are not
/// header rows (all `<th>`).
fn is_body_row(row: &ElementNode, context: TableContext) -> bool {
    match context {
        TableContext::Body => true,
        TableContext::Table => {
            let mut cells = row.children.iter().filter_map(|c| match c {
                DomNode::Element(e) => Some(&e.tag),
                DomNode::Text(_) => None,
            });
            !cells.all(|tag| *tag == Tag::Th)
        }
        TableContext::Head | TableContext::Outside => false,
    }
}
