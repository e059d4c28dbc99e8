use particle_mirror::config::{FieldConfig, rgb_hex};
use particle_mirror::field::{FieldError, ParticleField};

fn field(w: usize, h: usize) -> ParticleField {
    ParticleField::new(w, h, &FieldConfig::default()).unwrap()
}

#[test]
fn one_particle_per_pixel() {
    let f = field(16, 9);
    assert_eq!(f.len(), 144);
    assert_eq!(f.positions().len(), 144 * 3);
    assert_eq!(f.colors().len(), 144 * 3);
    assert_eq!(f.sizes().len(), 144);
}

#[test]
fn index_maps_row_major() {
    let f = field(5, 4);
    assert_eq!(f.index_of(0, 0), 0);
    assert_eq!(f.index_of(4, 0), 4);
    assert_eq!(f.index_of(0, 1), 5);
    assert_eq!(f.index_of(3, 2), 13);
    assert_eq!(f.cell_of(13), (3, 2));
    for i in 0..f.len() {
        let (x, y) = f.cell_of(i);
        assert_eq!(f.index_of(x, y), i);
    }
}

#[test]
fn positions_are_centered_with_default_constant() {
    let f = field(4, 6);
    // x - W/2, -y + H/2, 0
    assert_eq!(f.position(0), [-2.0, 3.0, 0.0]);
    assert_eq!(f.position(f.index_of(3, 0)), [1.0, 3.0, 0.0]);
    assert_eq!(f.position(f.index_of(2, 5)), [0.0, -2.0, 0.0]);
}

#[test]
fn centering_constant_moves_rows() {
    let cfg = FieldConfig {
        centering: 4.0,
        ..FieldConfig::default()
    };
    let f = ParticleField::new(4, 8, &cfg).unwrap();
    assert_eq!(f.position(0), [-2.0, 2.0, 0.0]);
    assert_eq!(f.position(f.index_of(0, 7)), [-2.0, -5.0, 0.0]);
}

#[test]
fn starts_at_baseline_color_and_size() {
    let f = field(3, 3);
    let base = rgb_hex(0xff3b6c);
    assert_eq!(f.base_color(), base);
    for i in 0..f.len() {
        assert_eq!(f.color(i), base);
    }
    assert!(f.sizes().iter().all(|&s| s == 20.0));
    assert!(f.positions_dirty && f.colors_dirty);
}

#[test]
fn empty_frame_is_rejected() {
    let err = ParticleField::new(0, 4, &FieldConfig::default()).unwrap_err();
    assert_eq!(err, FieldError::EmptyFrame(0, 4));
}

#[test]
fn setters_touch_one_particle() {
    let mut f = field(3, 2);
    f.clear_dirty();
    f.set_z(4, 12.5);
    f.set_color(4, [0.1, 0.2, 0.3]);
    assert_eq!(f.position(4)[2], 12.5);
    assert_eq!(f.position(3)[2], 0.0);
    assert_eq!(f.color(4), [0.1, 0.2, 0.3]);
    // Setters leave flagging to the caller.
    assert!(!f.positions_dirty && !f.colors_dirty);

    f.mark_dirty(true, false);
    assert!(f.positions_dirty && !f.colors_dirty);
    f.reset_colors();
    assert_eq!(f.color(4), f.base_color());
    assert!(f.colors_dirty);
}
