/// Largest region of the source with the canvas aspect ratio. Never larger
/// than the source in either dimension.
pub fn cover_crop(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let (cw, ch) = (u64::from(canvas_w.max(1)), u64::from(canvas_h.max(1)));
    let (iw, ih) = (u64::from(src_w.max(1)), u64::from(src_h.max(1)));
    if iw * ch > ih * cw {
        // source is wider than the canvas: keep full height
        let w = ((ih * cw + ch / 2) / ch).clamp(1, iw);
        (w as u32, ih as u32)
    } else {
        let h = ((iw * ch + cw / 2) / cw).clamp(1, ih);
        (iw as u32, h as u32)
    }
}

/// Largest size that fits inside `canvas` while keeping the source aspect ratio.
pub fn resize_to_contain(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f64;
    let ih = src_h.max(1) as f64;
    let cw = canvas_w.max(1) as f64;
    let ch = canvas_h.max(1) as f64;
    let scale = (cw / iw).min(ch / ih);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw);
    let h = (ih * scale).round().clamp(1.0, ch);
    (w as u32, h as u32)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}
