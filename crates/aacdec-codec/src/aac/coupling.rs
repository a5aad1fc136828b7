//! 耦合声道 (CCE) 的叠加.

use super::ics::{MAX_BANDS, ZERO_HCB};
use super::syntax::CouplingElement;
use super::tables::BandLayout;

/// CCE 作用到指定目标元素的声道
///
/// 返回 `(元素内声道序号, 增益表下标)`. 不匹配的目标也会推进增益下标.
pub fn coupled_channels(
    element: &CouplingElement,
    is_cpe: bool,
    tag: u8,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut index = 0;
    for target in &element.targets {
        if target.is_cpe != is_cpe || target.tag != tag {
            index += 1 + usize::from(target.ch_select == 3);
            continue;
        }
        if target.ch_select != 1 {
            out.push((0, index));
            if target.ch_select != 0 {
                index += 1;
            }
        }
        if target.ch_select != 2 {
            out.push((1, index));
            index += 1;
        }
    }
    out
}

/// 频域耦合: 在 CCE 的非零频带上 `dest += gain * src`
pub fn apply_dependent(
    element: &CouplingElement,
    layout: &BandLayout,
    gain_index: usize,
    src: &[f32],
    dest: &mut [f32],
) {
    let Some(gains) = element.gains.get(gain_index) else {
        return;
    };
    let info = &element.stream.info;
    let offsets = info.band_offsets(layout);
    let win_len = info.window_length(layout);
    for (g, (first, len)) in info.groups().enumerate() {
        for sfb in 0..info.max_sfb {
            if element.stream.band_types[g][sfb] == ZERO_HCB {
                continue;
            }
            let gain = gains.get(g * MAX_BANDS + sfb).copied().unwrap_or(0.0);
            for w in first..first + len {
                let base = w * win_len;
                for k in base + offsets[sfb]..base + offsets[sfb + 1] {
                    dest[k] += gain * src[k];
                }
            }
        }
    }
}

/// 时域耦合: 整帧 `dest += gain * src`
pub fn apply_independent(
    element: &CouplingElement,
    gain_index: usize,
    src: &[f32],
    dest: &mut [f32],
) {
    let Some(&gain) = element.gains.get(gain_index).and_then(|g| g.first()) else {
        return;
    };
    for (d, s) in dest.iter_mut().zip(src) {
        *d += gain * s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aac::config::Profile;
    use crate::aac::ics::tests::write_simple_ics;
    use crate::aac::ics::{ChannelStream, ParseContext};
    use crate::aac::syntax::{CouplingPoint, CouplingTarget};
    use aacdec_core::bitreader::BitReader;
    use aacdec_core::bitwriter::BitWriter;

    fn element(
        point: CouplingPoint,
        targets: Vec<CouplingTarget>,
        gains: Vec<Vec<f32>>,
    ) -> CouplingElement {
        let layout = BandLayout::new(4, 1024);
        let mut bw = BitWriter::new();
        write_simple_ics(&mut bw, 100, 2, 80, true);
        let data = bw.finish();
        let ctx = ParseContext {
            profile: Profile::AacLc,
            layout: &layout,
        };
        let stream = ChannelStream::parse(&mut BitReader::new(&data), &ctx, None).unwrap();
        CouplingElement {
            point,
            targets,
            stream,
            gains,
        }
    }

    fn target(is_cpe: bool, tag: u8, ch_select: u8) -> CouplingTarget {
        CouplingTarget {
            is_cpe,
            tag,
            ch_select,
        }
    }

    #[test]
    fn test_增益下标遍历() {
        let cce = element(
            CouplingPoint::BeforeTns,
            vec![
                target(false, 0, 2),
                target(true, 0, 3),
                target(true, 1, 0),
                target(true, 2, 1),
            ],
            Vec::new(),
        );
        assert_eq!(coupled_channels(&cce, false, 0), vec![(0, 0)]);
        assert_eq!(coupled_channels(&cce, true, 0), vec![(0, 1), (1, 2)]);
        assert_eq!(coupled_channels(&cce, true, 1), vec![(0, 3), (1, 3)]);
        assert_eq!(coupled_channels(&cce, true, 2), vec![(1, 4)]);
        assert!(coupled_channels(&cce, false, 5).is_empty());
    }

    #[test]
    fn test_频域耦合只作用于非零频带() {
        let layout = BandLayout::new(4, 1024);
        let mut gains = vec![0.0f32; 8 * MAX_BANDS];
        gains[0] = 0.5;
        gains[1] = 2.0;
        let cce = element(CouplingPoint::BeforeTns, vec![target(false, 0, 2)], vec![gains]);
        let src = vec![1.0f32; 1024];
        let mut dest = vec![10.0f32; 1024];
        apply_dependent(&cce, &layout, 0, &src, &mut dest);
        assert_eq!(&dest[..4], &[10.5; 4]);
        assert_eq!(&dest[4..8], &[12.0; 4]);
        assert!(dest[8..].iter().all(|&v| v == 10.0));
    }

    #[test]
    fn test_时域耦合() {
        let targets = vec![target(false, 0, 2)];
        let cce = element(CouplingPoint::AfterImdct, targets, vec![vec![0.25]]);
        let src = vec![4.0f32; 1024];
        let mut dest = vec![1.0f32; 1024];
        apply_independent(&cce, 0, &src, &mut dest);
        assert!(dest.iter().all(|&v| v == 2.0));
        // 越界下标不做任何事
        apply_independent(&cce, 3, &src, &mut dest);
        assert!(dest.iter().all(|&v| v == 2.0));
    }
}
