use criterion::{black_box, criterion_group, criterion_main, Criterion};
use x11_windowing::backend::x11::{
    choose_video_mode, parse_uri_list, translate_keysyms, CoreKeymap, KeyTable, VideoMode,
};

/// Letters on every row of a US layout, named like XKB does.
fn key_names() -> Vec<(u8, [u8; 4])> {
    let rows: [(&[u8; 2], u8, u8); 4] = [(b"AE", 10, 12), (b"AD", 24, 12), (b"AC", 38, 11), (b"AB", 52, 10)];
    let mut names = Vec::new();
    for (row, first, count) in rows {
        for column in 0..count {
            let digits = format!("{:02}", column + 1);
            let digits = digits.as_bytes();
            names.push((first + column, [row[0], row[1], digits[0], digits[1]]));
        }
    }
    names
}

fn keymap() -> CoreKeymap {
    let mut keysyms = vec![0u32; (255 - 8 + 1) * 2];
    for (index, letter) in (b'a'..=b'z').enumerate() {
        let row = (index + 16) * 2;
        keysyms[row] = u32::from(letter);
        keysyms[row + 1] = u32::from(letter.to_ascii_uppercase());
    }
    CoreKeymap::new(8, 2, keysyms)
}

fn criterion_benchmark(c: &mut Criterion) {
    let names = key_names();
    let keymap = keymap();
    c.bench_function("KeyTable::build", |b| {
        b.iter(|| KeyTable::build(black_box(&names), &[], black_box(&keymap)))
    });
    c.bench_function("KeyTable::build keysyms only", |b| {
        b.iter(|| KeyTable::build(&[], &[], black_box(&keymap)))
    });
    c.bench_function("translate_keysyms", |b| {
        b.iter(|| {
            for keysym in 0x20u32..0x7f {
                black_box(translate_keysyms(black_box(keysym), None));
            }
        })
    });

    let uri_list: String = (0..64)
        .map(|i| format!("file:///home/user/Pictures/holiday%20{}.png\r\n", i))
        .collect();
    c.bench_function("parse_uri_list", |b| {
        b.iter(|| parse_uri_list(black_box(uri_list.as_bytes())))
    });

    let modes: Vec<VideoMode> = [(640, 480), (1024, 768), (1280, 720), (1920, 1080), (2560, 1440)]
        .iter()
        .flat_map(|&(width, height)| {
            [60, 75, 144].into_iter().map(move |refresh_rate| VideoMode {
                width,
                height,
                red_bits: 8,
                green_bits: 8,
                blue_bits: 8,
                refresh_rate,
            })
        })
        .collect();
    let desired = VideoMode {
        width: 1900,
        height: 1000,
        refresh_rate: 70,
        ..VideoMode::default()
    };
    c.bench_function("choose_video_mode", |b| {
        b.iter(|| choose_video_mode(black_box(&modes), black_box(&desired)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
