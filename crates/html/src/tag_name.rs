//! Tag identity
//!
//! Every tag the tree builder treats specially gets its own variant so that
//! dispatch is an exhaustive `match`; anything else is interned as `Other`.

use std::fmt;

use string_cache::DefaultAtom;

macro_rules! tag_names {
    ($($variant:ident => $name:literal,)*) => {
        /// Upper-cased HTML tag name
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum TagName {
            $($variant,)*
            /// Any tag without special handling, stored upper-cased
            Other(DefaultAtom),
        }

        impl TagName {
            /// Classify a tag name, ignoring ASCII case
            pub fn from_name(name: &str) -> Self {
                let upper = name.to_ascii_uppercase();
                match upper.as_str() {
                    $($name => TagName::$variant,)*
                    _ => TagName::Other(DefaultAtom::from(upper)),
                }
            }

            /// Upper-cased name
            pub fn as_str(&self) -> &str {
                match self {
                    $(TagName::$variant => $name,)*
                    TagName::Other(atom) => atom.as_ref(),
                }
            }
        }
    };
}

tag_names! {
    A => "A",
    Address => "ADDRESS",
    Applet => "APPLET",
    Area => "AREA",
    Article => "ARTICLE",
    Aside => "ASIDE",
    B => "B",
    Base => "BASE",
    Basefont => "BASEFONT",
    Bgsound => "BGSOUND",
    Big => "BIG",
    Blockquote => "BLOCKQUOTE",
    Body => "BODY",
    Br => "BR",
    Button => "BUTTON",
    Caption => "CAPTION",
    Center => "CENTER",
    Code => "CODE",
    Col => "COL",
    Colgroup => "COLGROUP",
    Dd => "DD",
    Details => "DETAILS",
    Dialog => "DIALOG",
    Dir => "DIR",
    Div => "DIV",
    Dl => "DL",
    Dt => "DT",
    Em => "EM",
    Embed => "EMBED",
    Fieldset => "FIELDSET",
    Figcaption => "FIGCAPTION",
    Figure => "FIGURE",
    Font => "FONT",
    Footer => "FOOTER",
    Form => "FORM",
    Frame => "FRAME",
    Frameset => "FRAMESET",
    H1 => "H1",
    H2 => "H2",
    H3 => "H3",
    H4 => "H4",
    H5 => "H5",
    H6 => "H6",
    Head => "HEAD",
    Header => "HEADER",
    Hgroup => "HGROUP",
    Hr => "HR",
    Html => "HTML",
    I => "I",
    Iframe => "IFRAME",
    Image => "IMAGE",
    Img => "IMG",
    Input => "INPUT",
    Keygen => "KEYGEN",
    Li => "LI",
    Link => "LINK",
    Listing => "LISTING",
    Main => "MAIN",
    Marquee => "MARQUEE",
    Math => "MATH",
    Menu => "MENU",
    Meta => "META",
    Nav => "NAV",
    Nobr => "NOBR",
    Noembed => "NOEMBED",
    Noframes => "NOFRAMES",
    Noscript => "NOSCRIPT",
    Object => "OBJECT",
    Ol => "OL",
    Optgroup => "OPTGROUP",
    Option => "OPTION",
    P => "P",
    Param => "PARAM",
    Plaintext => "PLAINTEXT",
    Pre => "PRE",
    Rb => "RB",
    Rp => "RP",
    Rt => "RT",
    Rtc => "RTC",
    Ruby => "RUBY",
    S => "S",
    Script => "SCRIPT",
    Search => "SEARCH",
    Section => "SECTION",
    Select => "SELECT",
    Small => "SMALL",
    Source => "SOURCE",
    Strike => "STRIKE",
    Strong => "STRONG",
    Style => "STYLE",
    Summary => "SUMMARY",
    Svg => "SVG",
    Table => "TABLE",
    Tbody => "TBODY",
    Td => "TD",
    Template => "TEMPLATE",
    Textarea => "TEXTAREA",
    Tfoot => "TFOOT",
    Th => "TH",
    Thead => "THEAD",
    Title => "TITLE",
    Tr => "TR",
    Track => "TRACK",
    Tt => "TT",
    U => "U",
    Ul => "UL",
    Wbr => "WBR",
    Xmp => "XMP",
}

impl TagName {
    /// Elements that never have content or a closer
    pub fn is_void(&self) -> bool {
        use TagName::*;
        matches!(
            self,
            Area | Base | Br | Col | Embed | Hr | Img | Input | Link | Meta | Source | Track | Wbr
        )
    }

    /// Elements of the "special" category, which stop end-tag and
    /// furthest-block searches
    pub fn is_special(&self) -> bool {
        use TagName::*;
        matches!(
            self,
            Address
                | Applet
                | Area
                | Article
                | Aside
                | Base
                | Basefont
                | Bgsound
                | Blockquote
                | Body
                | Br
                | Button
                | Caption
                | Center
                | Col
                | Colgroup
                | Dd
                | Details
                | Dir
                | Div
                | Dl
                | Dt
                | Embed
                | Fieldset
                | Figcaption
                | Figure
                | Footer
                | Form
                | Frame
                | Frameset
                | H1
                | H2
                | H3
                | H4
                | H5
                | H6
                | Head
                | Header
                | Hgroup
                | Hr
                | Html
                | Iframe
                | Img
                | Input
                | Keygen
                | Li
                | Link
                | Listing
                | Main
                | Marquee
                | Menu
                | Meta
                | Nav
                | Noembed
                | Noframes
                | Object
                | Ol
                | P
                | Param
                | Plaintext
                | Pre
                | Script
                | Search
                | Section
                | Select
                | Source
                | Style
                | Summary
                | Table
                | Tbody
                | Td
                | Template
                | Textarea
                | Tfoot
                | Th
                | Thead
                | Title
                | Tr
                | Track
                | Ul
                | Wbr
                | Xmp
        )
    }

    /// Elements tracked by the active formatting list
    pub fn is_formatting(&self) -> bool {
        use TagName::*;
        matches!(
            self,
            A | B | Big | Code | Em | Font | I | Nobr | S | Small | Strike | Strong | Tt | U
        )
    }

    pub fn is_heading(&self) -> bool {
        use TagName::*;
        matches!(self, H1 | H2 | H3 | H4 | H5 | H6)
    }

    /// Elements whose content the scanner consumes verbatim together with
    /// their closer
    pub fn is_raw_text(&self) -> bool {
        use TagName::*;
        matches!(
            self,
            Iframe | Noembed | Noframes | Script | Style | Textarea | Title | Xmp
        )
    }

    /// Raw text elements whose content still decodes character references
    pub fn is_escapable_raw_text(&self) -> bool {
        matches!(self, TagName::Textarea | TagName::Title)
    }

    /// Lowercased name as used by the output tree
    pub fn to_lowercase(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TagName {
    fn from(name: &str) -> Self {
        TagName::from_name(name)
    }
}
