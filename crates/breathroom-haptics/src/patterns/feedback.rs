//! Short one-shot patterns for UI feedback.

use super::{scale_pulses, IntensityParams};
use crate::types::{HapticsIntensity, VibrationPattern};

/// Length of the settings-screen intensity audition.
pub const PREVIEW_DURATION_MS: u32 = 2000;

/// Minimal confirmation pulse.
pub fn tick_pattern(params: IntensityParams) -> VibrationPattern {
    VibrationPattern::single(params.scale(12.0))
}

/// Slider detent, a touch lighter than [`tick_pattern`].
pub fn slider_tick_pattern(params: IntensityParams) -> VibrationPattern {
    VibrationPattern::single(params.scale(10.0))
}

/// Fading train for a panel sliding away.
pub fn wosh_hide_pattern(params: IntensityParams) -> VibrationPattern {
    scale_pulses(&[26, 16, 18, 14, 12], params)
}

/// Swelling train for a panel sliding in.
pub fn wosh_show_pattern(params: IntensityParams) -> VibrationPattern {
    scale_pulses(&[12, 14, 18, 16, 26], params)
}

/// Soft double tap when haptics are switched on.
pub fn confirm_enabled_pattern(params: IntensityParams) -> VibrationPattern {
    scale_pulses(&[14, 70, 10], params)
}

/// Mini inhale when breath-follow vibration is switched on.
pub fn confirm_breath_enabled_pattern(params: IntensityParams) -> VibrationPattern {
    scale_pulses(&[10, 60, 16, 60, 22], params)
}

/// Calm repeating pulse lasting about [`PREVIEW_DURATION_MS`], shaped by the
/// auditioned intensity rather than the saved one.
pub fn preview_pattern(intensity: HapticsIntensity) -> VibrationPattern {
    let params = IntensityParams::for_intensity(intensity);
    let (base_pulse, base_pause) = match intensity {
        HapticsIntensity::Low => (10.0, 180),
        HapticsIntensity::Med => (16.0, 130),
        HapticsIntensity::High => (22.0, 90),
    };
    let pulse = params.scale(base_pulse);
    let duration = u64::from(PREVIEW_DURATION_MS);

    let mut pattern = Vec::new();
    let mut spent = 0u64;
    while spent < duration {
        pattern.push(pulse);
        spent += u64::from(pulse);
        if spent + base_pause > duration {
            break;
        }
        pattern.push(base_pause as u32);
        spent += base_pause;
    }
    pattern.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wosh_trains_mirror_each_other() {
        let params = IntensityParams::for_intensity(HapticsIntensity::Med);
        let hide = wosh_hide_pattern(params);
        let show = wosh_show_pattern(params);
        assert_eq!(hide.len(), 5);
        let mut reversed = show.into_vec();
        reversed.reverse();
        assert_eq!(hide.into_vec(), reversed);
    }

    #[test]
    fn confirmations_scale_with_intensity() {
        let low = confirm_breath_enabled_pattern(IntensityParams::for_intensity(HapticsIntensity::Low));
        let high = confirm_breath_enabled_pattern(IntensityParams::for_intensity(HapticsIntensity::High));
        assert_eq!(low.as_slice(), &[6, 60, 9, 60, 12]);
        assert_eq!(high.as_slice(), &[16, 60, 25, 60, 34]);
    }

    #[test]
    fn preview_lasts_about_two_seconds() {
        for intensity in HapticsIntensity::ALL {
            let pattern = preview_pattern(intensity);
            assert!(pattern.total_ms() <= u64::from(PREVIEW_DURATION_MS) + 40, "{intensity}");
            assert!(pattern.total_ms() >= 1800, "{intensity}");
        }
    }

    #[test]
    fn stronger_previews_pulse_more_often() {
        let low = preview_pattern(HapticsIntensity::Low);
        let high = preview_pattern(HapticsIntensity::High);
        assert!(high.pulse_count() > low.pulse_count());
    }
}
