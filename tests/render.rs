use once_cell::sync::Lazy;
use svgrast::{ErrorKind, Options};

static DEFAULT_OPTIONS: Lazy<Options> = Lazy::new(Options::default);

fn render(svg: &str) -> tiny_skia::Pixmap {
    svgrast::render(svg.as_bytes(), &DEFAULT_OPTIONS).unwrap()
}

/// Returns the premultiplied RGBA bytes of a pixel.
fn pixel(pixmap: &tiny_skia::Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
    let idx = ((y * pixmap.width() + x) * 4) as usize;
    let data = pixmap.data();
    (data[idx], data[idx + 1], data[idx + 2], data[idx + 3])
}

fn alpha(pixmap: &tiny_skia::Pixmap, x: u32, y: u32) -> u8 {
    pixel(pixmap, x, y).3
}

#[test]
fn rect_clear() {
    let pixmap = render("<svg width=\"40\" height=\"30\"><rect width=\"40\" height=\"30\" fill=\"#ff0000\"/></svg>");
    assert_eq!(pixmap.width(), 40);
    assert_eq!(pixmap.height(), 30);
    assert_eq!(pixel(&pixmap, 20, 15), (255, 0, 0, 255));
}

#[test]
fn buffer_layout() {
    let pixmap = render("<svg width=\"17\" height=\"9\"><rect width=\"17\" height=\"9\" fill=\"green\" fill-opacity=\"0.4\"/></svg>");
    assert_eq!(pixmap.data().len(), 17 * 9 * 4);

    // Premultiplication: every channel stays below the alpha.
    for p in pixmap.data().chunks(4) {
        assert!(p[0] <= p[3] && p[1] <= p[3] && p[2] <= p[3]);
    }
}

#[test]
fn top_left_origin() {
    let pixmap = render(
        "<svg width=\"20\" height=\"20\">\
           <rect width=\"20\" height=\"8\" fill=\"#ff0000\"/>\
           <rect y=\"12\" width=\"20\" height=\"8\" fill=\"#0000ff\"/>\
         </svg>",
    );
    let top = pixel(&pixmap, 10, 2);
    let bottom = pixel(&pixmap, 10, 17);
    assert!(top.0 > 120 && top.2 < 50);
    assert!(bottom.2 > 120 && bottom.0 < 50);
}

#[test]
fn arc_stroke() {
    let pixmap = render(
        "<svg width=\"24\" height=\"24\">\
           <path d=\"M4 12 A8 8 0 0 1 20 12\" fill=\"none\" stroke=\"#ff0000\" stroke-width=\"2\"/>\
         </svg>",
    );
    // The arc must not collapse into its chord.
    assert!(pixel(&pixmap, 12, 12).0 < 80);
    assert!(pixel(&pixmap, 12, 4).0 > 120 || pixel(&pixmap, 12, 20).0 > 120);
}

#[test]
fn current_color_inheritance() {
    let pixmap = render(
        "<svg width=\"40\" height=\"20\">\
           <g fill=\"currentColor\" color=\"#ff0000\">\
             <rect width=\"20\" height=\"20\"/>\
             <g color=\"#0000ff\"><rect x=\"20\" width=\"20\" height=\"20\"/></g>\
           </g>\
         </svg>",
    );
    let left = pixel(&pixmap, 10, 10);
    let right = pixel(&pixmap, 30, 10);
    assert!(left.0 > 120 && left.2 < 50);
    assert!(right.2 > 120 && right.0 < 50);
}

#[test]
fn dashed_stroke() {
    let pixmap = render(
        "<svg width=\"40\" height=\"24\">\
           <line x1=\"2\" y1=\"12\" x2=\"38\" y2=\"12\" stroke=\"#ff0000\" stroke-width=\"4\" stroke-dasharray=\"6 4\"/>\
         </svg>",
    );
    assert!(alpha(&pixmap, 4, 12) > 120);
    assert!(alpha(&pixmap, 10, 12) < 20);
    assert!(alpha(&pixmap, 14, 12) > 120);
}

#[test]
fn view_box_is_centered() {
    let pixmap = render(
        "<svg width=\"200\" height=\"100\" viewBox=\"0 0 100 100\">\
           <rect width=\"100\" height=\"100\" fill=\"#ff0000\"/>\
         </svg>",
    );
    assert!(alpha(&pixmap, 10, 50) < 10);
    assert!(pixel(&pixmap, 100, 50).0 > 120);
    assert!(alpha(&pixmap, 190, 50) < 10);
}

#[test]
fn external_resource_blocked() {
    let err = svgrast::render(
        b"<svg width=\"20\" height=\"20\"><image href=\"https://example.com/a.png\" width=\"20\" height=\"20\"/></svg>",
        &DEFAULT_OPTIONS,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalResourceBlocked);
    assert!(err.to_string().contains("https://example.com/a.png"));
}

#[test]
fn invalid_root() {
    let err = svgrast::render(b"<html></html>", &DEFAULT_OPTIONS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDocument);
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(ErrorKind::None as u8, 0);
    assert_eq!(ErrorKind::InvalidDocument as u8, 1);
    assert_eq!(ErrorKind::UnsupportedFeature as u8, 2);
    assert_eq!(ErrorKind::ExternalResourceBlocked as u8, 3);
    assert_eq!(ErrorKind::ExternalResourceFailed as u8, 4);
    assert_eq!(ErrorKind::RenderFailed as u8, 5);
}

#[test]
fn rendering_is_idempotent() {
    let svg = "<svg width=\"30\" height=\"30\">\
                 <circle cx=\"15\" cy=\"15\" r=\"10\" fill=\"#123456\" stroke=\"gold\"/>\
               </svg>";
    assert_eq!(render(svg).data(), render(svg).data());
}

#[test]
fn empty_path_paints_nothing_and_does_not_fail() {
    let pixmap = render("<svg width=\"10\" height=\"10\"><path d=\"M 5 5 Z\" fill=\"red\"/></svg>");
    assert!(pixmap.data().iter().all(|&b| b == 0));
}

#[test]
fn transparent_rgba_fill_stays_transparent() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <rect width=\"10\" height=\"10\" fill=\"rgba(255,0,0,0)\" fill-opacity=\"1\"/>\
         </svg>",
    );
    assert_eq!(alpha(&pixmap, 5, 5), 0);
}

#[test]
fn group_opacity_is_layered() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <g opacity=\"0.5\"><rect width=\"10\" height=\"10\" fill=\"#ff0000\"/></g>\
         </svg>",
    );
    let (r, _, _, a) = pixel(&pixmap, 5, 5);
    assert!((120..=135).contains(&a));
    assert!((120..=135).contains(&r));
}

#[test]
fn transform_composition_is_left_to_right() {
    // translate(10 0) scale(2): the unit rect at x=1 lands on 12..14.
    let pixmap = render(
        "<svg width=\"30\" height=\"10\">\
           <rect x=\"1\" width=\"2\" height=\"5\" fill=\"red\" transform=\"translate(10 0) scale(2)\"/>\
         </svg>",
    );
    assert!(alpha(&pixmap, 11, 2) < 10);
    assert!(alpha(&pixmap, 13, 2) > 200);
    assert!(alpha(&pixmap, 15, 2) < 10);
}

#[test]
fn use_references_and_cycles() {
    let pixmap = render(
        "<svg width=\"20\" height=\"10\">\
           <defs><rect id=\"r\" width=\"5\" height=\"5\" fill=\"#00ff00\"/></defs>\
           <use href=\"#r\" x=\"10\"/>\
           <use href=\"#missing\"/>\
           <use id=\"self\" href=\"#self\"/>\
         </svg>",
    );
    assert!(pixel(&pixmap, 12, 2).1 > 200);
    // The defs content itself is not painted.
    assert!(alpha(&pixmap, 2, 2) == 0);
}

#[test]
fn use_cycle_pair_terminates() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <use id=\"a\" href=\"#b\"/>\
           <use id=\"b\" href=\"#a\"/>\
         </svg>",
    );
    assert!(pixmap.data().iter().all(|&b| b == 0));
}

#[test]
fn nested_svg_is_clipped_to_its_viewport() {
    let pixmap = render(
        "<svg width=\"30\" height=\"30\">\
           <svg x=\"5\" y=\"5\" width=\"10\" height=\"10\">\
             <rect width=\"30\" height=\"30\" fill=\"red\"/>\
           </svg>\
         </svg>",
    );
    assert!(alpha(&pixmap, 2, 2) == 0);
    assert!(alpha(&pixmap, 10, 10) > 200);
    assert!(alpha(&pixmap, 20, 10) == 0);
}

#[test]
fn zero_sized_nested_svg_is_skipped() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <svg width=\"0\" height=\"5\"><rect width=\"5\" height=\"5\" fill=\"red\"/></svg>\
         </svg>",
    );
    assert!(pixmap.data().iter().all(|&b| b == 0));
}

#[test]
fn evenodd_fill_rule() {
    let pixmap = render(
        "<svg width=\"20\" height=\"20\">\
           <path d=\"M2 2 H18 V18 H2 Z M6 6 H14 V14 H6 Z\" fill=\"red\" fill-rule=\"evenodd\"/>\
         </svg>",
    );
    assert!(alpha(&pixmap, 4, 10) > 200);
    // The inner square is a hole.
    assert!(alpha(&pixmap, 10, 10) < 10);
}

#[test]
fn linear_gradient() {
    let pixmap = render(
        "<svg width=\"100\" height=\"10\">\
           <defs>\
             <linearGradient id=\"g\">\
               <stop offset=\"0\" stop-color=\"#ff0000\"/>\
               <stop offset=\"1\" stop-color=\"#0000ff\"/>\
             </linearGradient>\
           </defs>\
           <rect width=\"100\" height=\"10\" fill=\"url(#g)\"/>\
         </svg>",
    );
    let left = pixel(&pixmap, 3, 5);
    let right = pixel(&pixmap, 96, 5);
    assert!(left.0 > 200 && left.2 < 50);
    assert!(right.2 > 200 && right.0 < 50);
}

#[test]
fn gradient_stops_inherit_through_href() {
    let pixmap = render(
        "<svg width=\"20\" height=\"10\">\
           <defs>\
             <linearGradient id=\"base\">\
               <stop offset=\"0\" stop-color=\"#00ff00\"/>\
               <stop offset=\"1\" stop-color=\"#00ff00\"/>\
             </linearGradient>\
             <linearGradient id=\"g\" href=\"#base\"/>\
           </defs>\
           <rect width=\"20\" height=\"10\" fill=\"url(#g)\"/>\
         </svg>",
    );
    assert!(pixel(&pixmap, 10, 5).1 > 200);
}

#[test]
fn broken_paint_reference_uses_fallback() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <rect width=\"10\" height=\"10\" fill=\"url(#nope) #00ff00\"/>\
         </svg>",
    );
    assert!(pixel(&pixmap, 5, 5).1 > 200);
}

#[test]
fn pattern_tiles() {
    let pixmap = render(
        "<svg width=\"40\" height=\"40\">\
           <defs>\
             <pattern id=\"p\" patternUnits=\"userSpaceOnUse\" width=\"10\" height=\"10\">\
               <rect width=\"5\" height=\"5\" fill=\"#ff0000\"/>\
             </pattern>\
           </defs>\
           <rect width=\"40\" height=\"40\" fill=\"url(#p)\"/>\
         </svg>",
    );
    assert!(pixel(&pixmap, 2, 2).0 > 200);
    assert!(alpha(&pixmap, 7, 7) < 30);
    // The next tile repeats the cell.
    assert!(pixel(&pixmap, 12, 12).0 > 200);
}

#[test]
fn stylesheet_and_inline_style() {
    let pixmap = render(
        "<svg width=\"20\" height=\"10\">\
           <style>rect { fill: #00ff00 }</style>\
           <rect width=\"10\" height=\"10\"/>\
           <rect x=\"10\" width=\"10\" height=\"10\" style=\"fill: #0000ff\"/>\
         </svg>",
    );
    assert!(pixel(&pixmap, 5, 5).1 > 200);
    assert!(pixel(&pixmap, 15, 5).2 > 200);
}

#[test]
fn doctype_entities_expand() {
    let pixmap = render(
        "<!DOCTYPE svg [<!ENTITY c \"#00ff00\">]>\
         <svg width=\"10\" height=\"10\"><rect width=\"10\" height=\"10\" fill=\"&c;\"/></svg>",
    );
    assert!(pixel(&pixmap, 5, 5).1 > 200);
}

#[test]
fn billion_laughs_terminates() {
    let svg = "<!DOCTYPE svg [\
                 <!ENTITY a \"ha\">\
                 <!ENTITY b \"&a;&a;&a;&a;&a;&a;&a;&a;&a;&a;\">\
                 <!ENTITY c \"&b;&b;&b;&b;&b;&b;&b;&b;&b;&b;\">\
                 <!ENTITY d \"&c;&c;&c;&c;&c;&c;&c;&c;&c;&c;\">\
                 <!ENTITY e \"&d;&d;&d;&d;&d;&d;&d;&d;&d;&d;\">\
               ]>\
               <svg width=\"4\" height=\"4\" note=\"&e;\"/>";
    // Must terminate and produce either an image or a structured error.
    let _ = svgrast::render(svg.as_bytes(), &DEFAULT_OPTIONS);
}

#[test]
fn svgz_input() {
    use std::io::Write;

    let svg = "<svg width=\"10\" height=\"10\"><rect width=\"10\" height=\"10\" fill=\"#ff0000\"/></svg>";
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(svg.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let plain = render(svg);
    let gz = svgrast::render(&compressed, &DEFAULT_OPTIONS).unwrap();
    assert_eq!(plain.data(), gz.data());
}

#[test]
fn background_clear() {
    let mut opt = Options::default();
    opt.background = tiny_skia::Color::from_rgba8(0, 0, 255, 255).into();
    let pixmap = svgrast::render(b"<svg width=\"5\" height=\"5\"/>", &opt).unwrap();
    assert_eq!(pixel(&pixmap, 2, 2), (0, 0, 255, 255));
}

#[test]
fn scale_option() {
    let mut opt = Options::default();
    opt.scale = 3.0;
    let pixmap = svgrast::render(
        b"<svg width=\"10\" height=\"10\"><rect width=\"10\" height=\"10\" fill=\"red\"/></svg>",
        &opt,
    )
    .unwrap();
    assert_eq!(pixmap.width(), 30);
    assert_eq!(pixmap.height(), 30);
    assert!(pixel(&pixmap, 25, 25).0 > 200);
}

#[test]
fn display_none_hides_the_subtree() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <g display=\"none\"><rect width=\"10\" height=\"10\" fill=\"red\"/></g>\
           <rect width=\"10\" height=\"10\" fill=\"red\" visibility=\"hidden\"/>\
         </svg>",
    );
    assert!(pixmap.data().iter().all(|&b| b == 0));
}

#[test]
fn unknown_wrapper_does_not_hide_children() {
    let pixmap = render(
        "<svg width=\"10\" height=\"10\">\
           <foreignObject-like><rect width=\"10\" height=\"10\" fill=\"#ff0000\"/></foreignObject-like>\
         </svg>",
    );
    assert!(pixel(&pixmap, 5, 5).0 > 200);
}

#[test]
fn text_renders_without_failing() {
    // Fonts may be missing entirely in the environment,
    // so only the success of the render is checked.
    let pixmap = render(
        "<svg width=\"100\" height=\"30\">\
           <text x=\"10\" y=\"20\" font-size=\"14\" text-anchor=\"middle\">hi there</text>\
         </svg>",
    );
    assert_eq!(pixmap.width(), 100);
}

#[test]
fn local_image_file() {
    let path = std::env::temp_dir().join("svgrast_test_image.png");
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = png::Encoder::new(file, 2, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&[
                255, 0, 0, 255, 255, 0, 0, 255, //
                255, 0, 0, 255, 255, 0, 0, 255,
            ])
            .unwrap();
    }

    let svg = format!(
        "<svg width=\"10\" height=\"10\"><image href=\"{}\" width=\"10\" height=\"10\"/></svg>",
        path.display()
    );
    let pixmap = render(&svg);
    std::fs::remove_file(&path).ok();

    assert!(pixel(&pixmap, 5, 5).0 > 200);
}

mod filters {
    use super::*;

    #[test]
    fn flood_fills_the_region() {
        let pixmap = render(
            "<svg width=\"20\" height=\"20\">\
               <defs><filter id=\"f\"><feFlood flood-color=\"#00ff00\"/></filter></defs>\
               <rect width=\"5\" height=\"5\" filter=\"url(#f)\"/>\
             </svg>",
        );
        assert!(pixel(&pixmap, 1, 1).1 > 200);
        assert!(pixel(&pixmap, 18, 18).1 > 200);
    }

    #[test]
    fn offset_shifts_pixels() {
        let pixmap = render(
            "<svg width=\"30\" height=\"30\">\
               <defs><filter id=\"f\"><feOffset dx=\"10\" dy=\"10\"/></filter></defs>\
               <rect width=\"10\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        assert!(alpha(&pixmap, 5, 5) == 0);
        assert!(pixel(&pixmap, 15, 15).0 > 200);
    }

    #[test]
    fn gaussian_blur_softens_edges() {
        let pixmap = render(
            "<svg width=\"30\" height=\"30\">\
               <defs><filter id=\"f\"><feGaussianBlur stdDeviation=\"2\"/></filter></defs>\
               <rect x=\"10\" y=\"10\" width=\"10\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        let center = alpha(&pixmap, 15, 15);
        let outside_edge = alpha(&pixmap, 8, 15);
        assert!(center > 200);
        assert!(outside_edge > 0 && outside_edge < center);
    }

    #[test]
    fn color_matrix_desaturates() {
        let pixmap = render(
            "<svg width=\"10\" height=\"10\">\
               <defs><filter id=\"f\"><feColorMatrix type=\"saturate\" values=\"0\"/></filter></defs>\
               <rect width=\"10\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        let (r, g, b, a) = pixel(&pixmap, 5, 5);
        assert_eq!(a, 255);
        assert!(r.abs_diff(g) < 20 && g.abs_diff(b) < 20);
    }

    #[test]
    fn unknown_primitive_passes_through() {
        let pixmap = render(
            "<svg width=\"10\" height=\"10\">\
               <defs><filter id=\"f\"><feDropShadow dx=\"2\"/></filter></defs>\
               <rect width=\"10\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        assert!(pixel(&pixmap, 5, 5).0 > 200);
    }

    #[test]
    fn strict_mode_rejects_unsupported_primitives() {
        let mut opt = Options::default();
        opt.compat.strict_mode = true;
        let err = svgrast::render(
            b"<svg width=\"10\" height=\"10\">\
                <filter id=\"f\"><feDropShadow dx=\"2\"/></filter>\
              </svg>",
            &opt,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);

        opt.compat.allow_unsupported_filter_fallback = true;
        assert!(svgrast::render(
            b"<svg width=\"10\" height=\"10\">\
                <filter id=\"f\"><feDropShadow dx=\"2\"/></filter>\
              </svg>",
            &opt,
        )
        .is_ok());
    }

    #[test]
    fn merge_composites_inputs() {
        let pixmap = render(
            "<svg width=\"30\" height=\"10\">\
               <defs>\
                 <filter id=\"f\">\
                   <feOffset dx=\"10\" result=\"moved\"/>\
                   <feMerge>\
                     <feMergeNode in=\"SourceGraphic\"/>\
                     <feMergeNode in=\"moved\"/>\
                   </feMerge>\
                 </filter>\
               </defs>\
               <rect width=\"5\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        assert!(pixel(&pixmap, 2, 5).0 > 200);
        assert!(pixel(&pixmap, 12, 5).0 > 200);
    }

    #[test]
    fn composite_in_clips_to_backdrop() {
        let pixmap = render(
            "<svg width=\"20\" height=\"10\">\
               <defs>\
                 <filter id=\"f\">\
                   <feFlood flood-color=\"#00ff00\" result=\"c\"/>\
                   <feComposite in=\"c\" in2=\"SourceGraphic\" operator=\"in\"/>\
                 </filter>\
               </defs>\
               <rect width=\"10\" height=\"10\" fill=\"#ff0000\" filter=\"url(#f)\"/>\
             </svg>",
        );
        assert!(pixel(&pixmap, 5, 5).1 > 200);
        assert!(alpha(&pixmap, 15, 5) == 0);
    }

    #[test]
    fn filter_keeps_element_opacity() {
        let pixmap = render(
            "<svg width=\"10\" height=\"10\">\
               <defs><filter id=\"f\"><feOffset/></filter></defs>\
               <rect width=\"10\" height=\"10\" fill=\"#ff0000\" opacity=\"0.5\" filter=\"url(#f)\"/>\
             </svg>",
        );
        let a = alpha(&pixmap, 5, 5);
        assert!((120..=135).contains(&a));
    }

    #[test]
    fn turbulence_is_deterministic() {
        let svg = "<svg width=\"20\" height=\"20\">\
                     <defs><filter id=\"f\">\
                       <feTurbulence baseFrequency=\"0.3\" numOctaves=\"2\" seed=\"7\"/>\
                     </filter></defs>\
                     <rect width=\"20\" height=\"20\" filter=\"url(#f)\"/>\
                   </svg>";
        assert_eq!(render(svg).data(), render(svg).data());
        // The noise actually produced something.
        assert!(render(svg).data().iter().any(|&b| b != 0));
    }
}
