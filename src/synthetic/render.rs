use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut, text_size};
use serde::{Deserialize, Serialize};

use super::document::SyntheticDocument;
use super::SyntheticError;
use crate::models::enums::EntityLabel;

// ═══════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════

pub const CANVAS_WIDTH: u32 = 800;
pub const CANVAS_HEIGHT: u32 = 1000;
const BACKGROUND: Rgb<u8> = Rgb([250, 250, 250]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);
const SOFT_INK: Rgb<u8> = Rgb([0x33, 0x33, 0x33]);

const TITLE: &str = "ORDONNANCE";
const TITLE_POS: (i32, i32) = (300, 50);
const PRESCRIBER_POS: (i32, i32) = (50, 120);
const PATIENT_POS: (i32, i32) = (50, 150);
const RULE_Y: f32 = 190.0;
const RULE_X: (f32, f32) = (50.0, 750.0);

const FIRST_ROW_Y: i32 = 220;
const DRUG_X: i32 = 50;
const POSOLOGY_X: i32 = 70;
const DRUG_ROW_ADVANCE: i32 = 30;
const POSOLOGY_ROW_ADVANCE: i32 = 50;

const REGULAR_SIZE: f32 = 20.0;
const BOLD_SIZE: f32 = 24.0;

/// One labelled text span with its rendered box `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    pub label: EntityLabel,
    pub text: String,
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
}

// ═══════════════════════════════════════════
// Fonts
// ═══════════════════════════════════════════

const REGULAR_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const BOLD_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Regular and bold faces used by the renderer.
pub struct FontSet {
    regular: FontVec,
    bold: FontVec,
}

impl FontSet {
    /// Load the configured fonts, else the first system font found.
    /// A missing bold face reuses the regular one.
    pub fn load(regular: Option<&Path>, bold: Option<&Path>) -> Result<Self, SyntheticError> {
        let regular_font = load_font(regular, REGULAR_FONT_CANDIDATES).ok_or_else(|| {
            SyntheticError::FontUnavailable(
                "set font_regular in the config or install DejaVu Sans".into(),
            )
        })?;

        let bold_font = match load_font(bold, BOLD_FONT_CANDIDATES) {
            Some(font) => font,
            None => {
                tracing::debug!("No bold font found, reusing regular face");
                load_font(regular, REGULAR_FONT_CANDIDATES).ok_or_else(|| {
                    SyntheticError::FontUnavailable("regular font vanished during load".into())
                })?
            }
        };

        Ok(Self {
            regular: regular_font,
            bold: bold_font,
        })
    }
}

fn load_font(configured: Option<&Path>, candidates: &[&str]) -> Option<FontVec> {
    let configured = configured.map(Path::to_path_buf);
    configured
        .into_iter()
        .chain(candidates.iter().map(PathBuf::from))
        .find_map(|path| {
            let data = std::fs::read(&path).ok()?;
            match FontVec::try_from_vec(data) {
                Ok(font) => {
                    tracing::debug!(path = %path.display(), "Font loaded");
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Not a usable font");
                    None
                }
            }
        })
}

// ═══════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════

/// Draw `doc` on a clean canvas and return the image with one DRUG and one
/// INSTRUCTION entry per line item, in rendering order.
pub fn render_prescription(
    doc: &SyntheticDocument,
    fonts: &FontSet,
) -> (RgbImage, Vec<GroundTruthEntry>) {
    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, BACKGROUND);
    let regular = PxScale::from(REGULAR_SIZE);
    let bold = PxScale::from(BOLD_SIZE);

    draw_text_mut(&mut canvas, INK, TITLE_POS.0, TITLE_POS.1, bold, &fonts.bold, TITLE);
    draw_text_mut(
        &mut canvas,
        INK,
        PRESCRIBER_POS.0,
        PRESCRIBER_POS.1,
        regular,
        &fonts.regular,
        &format!("Dr. {}", doc.prescriber_name),
    );
    draw_text_mut(
        &mut canvas,
        INK,
        PATIENT_POS.0,
        PATIENT_POS.1,
        regular,
        &fonts.regular,
        &format!("Patient: {}", doc.patient_name),
    );
    draw_line_segment_mut(&mut canvas, (RULE_X.0, RULE_Y), (RULE_X.1, RULE_Y), INK);

    let mut truth = Vec::with_capacity(doc.lines.len() * 2);
    let mut y = FIRST_ROW_Y;
    for (index, line) in doc.lines.iter().enumerate() {
        let drug_row = format!("{}. {} {}", index + 1, line.drug_name, line.strength);
        draw_text_mut(&mut canvas, INK, DRUG_X, y, bold, &fonts.bold, &drug_row);
        truth.push(GroundTruthEntry {
            label: EntityLabel::Drug,
            text: line.drug_name.clone(),
            bbox: text_box(DRUG_X, y, bold, &fonts.bold, &drug_row),
        });
        y += DRUG_ROW_ADVANCE;

        draw_text_mut(&mut canvas, SOFT_INK, POSOLOGY_X, y, regular, &fonts.regular, &line.posology);
        truth.push(GroundTruthEntry {
            label: EntityLabel::Instruction,
            text: line.posology.clone(),
            bbox: text_box(POSOLOGY_X, y, regular, &fonts.regular, &line.posology),
        });
        y += POSOLOGY_ROW_ADVANCE;
    }

    (canvas, truth)
}

/// The DRUG box spans the whole drawn row, number and strength included.
fn text_box(x: i32, y: i32, scale: PxScale, font: &FontVec, text: &str) -> [i32; 4] {
    let (width, height) = text_size(scale, font, text);
    [x, y, x + width as i32, y + height as i32]
}
