//! Camera block operations (category `0x04`): lens, exposure, colour and
//! picture settings.
use super::{
    check_range, on_off, with_nibbles, Builder, Category, Operation, ReplyShape, TOGGLE,
};
use crate::Result;

const ZOOM: u8 = 0x07;
const ZOOM_VALUE: u8 = 0x47;
const DZOOM: u8 = 0x06;
const FOCUS: u8 = 0x08;
const FOCUS_VALUE: u8 = 0x48;
const FOCUS_AUTO: u8 = 0x38;
const FOCUS_ONE_PUSH: u8 = 0x18;
const FOCUS_AUTO_SENSE: u8 = 0x58;
const FOCUS_NEAR_LIMIT: u8 = 0x28;
const WB: u8 = 0x35;
const WB_TRIGGER: u8 = 0x10;
const AUTO_EXPOSURE: u8 = 0x39;
const SLOW_SHUTTER: u8 = 0x5a;
const EXP_COMP_POWER: u8 = 0x3e;
const WIDE_MODE: u8 = 0x60;
const PICTURE_EFFECT: u8 = 0x63;
const DIGITAL_EFFECT: u8 = 0x64;
const DIGITAL_EFFECT_LEVEL: u8 = 0x65;
const MEMORY: u8 = 0x3f;
const DISPLAY: u8 = 0x15;
const DATE_TIME_SET: u8 = 0x70;
const WIDE_CON_LENS: u8 = 0x26;

const STOP: u8 = 0x00;
const UP: u8 = 0x02;
const DOWN: u8 = 0x03;
const RESET: u8 = 0x00;
const UP_SPEED: u8 = 0x20;
const DOWN_SPEED: u8 = 0x30;

/// Highest variable zoom and focus speed.
pub const MAX_LENS_SPEED: u8 = 7;

/// On/off settings which share the `op 0p` / `op` inquiry layout.
macro_rules! switches {
    (
        $($opcode:expr => $set:ident, $inquiry:ident;)*
    ) => {
        $(
            pub fn $set(on: bool) -> Operation {
                Operation::command(Category::Camera, [$opcode, on_off(on)])
            }

            pub fn $inquiry() -> Operation {
                Operation::inquiry(Category::Camera, [$opcode], ReplyShape::Byte)
            }
        )*
    };
}

switches!(
    DZOOM => digital_zoom, digital_zoom_inquiry;
    FOCUS_AUTO => auto_focus, auto_focus_inquiry;
    EXP_COMP_POWER => exposure_compensation_power, exposure_compensation_power_inquiry;
    0x33 => backlight, backlight_inquiry;
    0x01 => zero_lux, zero_lux_inquiry;
    0x31 => ir_led, ir_led_inquiry;
    0x61 => mirror, mirror_inquiry;
    0x62 => freeze, freeze_inquiry;
    DISPLAY => display, display_inquiry;
    0x71 => date_display, date_display_inquiry;
    0x72 => time_display, time_display_inquiry;
);

pub fn zoom_stop() -> Operation {
    Operation::command(Category::Camera, [ZOOM, STOP])
}

pub fn zoom_tele() -> Operation {
    Operation::command(Category::Camera, [ZOOM, UP])
}

pub fn zoom_wide() -> Operation {
    Operation::command(Category::Camera, [ZOOM, DOWN])
}

/// Zooms in at `speed` (0 to [MAX_LENS_SPEED]).
pub fn zoom_tele_speed(speed: u8) -> Result<Operation> {
    let speed = check_range("zoom speed", speed, 0..=MAX_LENS_SPEED)?;
    Ok(Operation::command(Category::Camera, [ZOOM, UP_SPEED | speed]))
}

pub fn zoom_wide_speed(speed: u8) -> Result<Operation> {
    let speed = check_range("zoom speed", speed, 0..=MAX_LENS_SPEED)?;
    Ok(Operation::command(Category::Camera, [ZOOM, DOWN_SPEED | speed]))
}

/// Moves the zoom to an absolute position.
pub fn zoom_direct(position: u16) -> Operation {
    Operation::command(Category::Camera, with_nibbles(&[ZOOM_VALUE], position))
}

/// Moves zoom and focus to absolute positions in a single command.
pub fn zoom_focus_direct(zoom: u16, focus: u16) -> Operation {
    let mut body = with_nibbles(&[ZOOM_VALUE], zoom);
    body.extend_from_slice(&crate::to_nibbles(focus));
    Operation::command(Category::Camera, body)
}

pub fn zoom_position_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [ZOOM_VALUE], ReplyShape::Nibble16)
}

pub fn focus_stop() -> Operation {
    Operation::command(Category::Camera, [FOCUS, STOP])
}

pub fn focus_far() -> Operation {
    Operation::command(Category::Camera, [FOCUS, UP])
}

pub fn focus_near() -> Operation {
    Operation::command(Category::Camera, [FOCUS, DOWN])
}

pub fn focus_far_speed(speed: u8) -> Result<Operation> {
    let speed = check_range("focus speed", speed, 0..=MAX_LENS_SPEED)?;
    Ok(Operation::command(Category::Camera, [FOCUS, UP_SPEED | speed]))
}

pub fn focus_near_speed(speed: u8) -> Result<Operation> {
    let speed = check_range("focus speed", speed, 0..=MAX_LENS_SPEED)?;
    Ok(Operation::command(Category::Camera, [FOCUS, DOWN_SPEED | speed]))
}

pub fn focus_direct(position: u16) -> Operation {
    Operation::command(Category::Camera, with_nibbles(&[FOCUS_VALUE], position))
}

pub fn focus_position_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [FOCUS_VALUE], ReplyShape::Nibble16)
}

pub fn auto_focus_toggle() -> Operation {
    Operation::command(Category::Camera, [FOCUS_AUTO, TOGGLE])
}

pub fn focus_one_push() -> Operation {
    Operation::command(Category::Camera, [FOCUS_ONE_PUSH, 0x01])
}

pub fn focus_infinity() -> Operation {
    Operation::command(Category::Camera, [FOCUS_ONE_PUSH, 0x02])
}

/// Sets auto focus sensitivity: `true` for high, `false` for low.
pub fn focus_auto_sense(high: bool) -> Operation {
    Operation::command(Category::Camera, [FOCUS_AUTO_SENSE, on_off(high)])
}

pub fn focus_auto_sense_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [FOCUS_AUTO_SENSE], ReplyShape::Byte)
}

pub fn focus_near_limit(limit: u16) -> Operation {
    Operation::command(Category::Camera, with_nibbles(&[FOCUS_NEAR_LIMIT], limit))
}

pub fn focus_near_limit_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [FOCUS_NEAR_LIMIT], ReplyShape::Nibble16)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum WhiteBalance {
    Auto = 0x00,
    Indoor = 0x01,
    Outdoor = 0x02,
    OnePush = 0x03,
    Atw = 0x04,
    Manual = 0x05,
}

pub fn white_balance(mode: WhiteBalance) -> Operation {
    Operation::command(Category::Camera, [WB, mode as u8])
}

/// Runs a one-push white balance, in [WhiteBalance::OnePush] mode.
pub fn white_balance_trigger() -> Operation {
    Operation::command(Category::Camera, [WB_TRIGGER, 0x05])
}

pub fn white_balance_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [WB], ReplyShape::Byte)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum AutoExposure {
    FullAuto = 0x00,
    Manual = 0x03,
    ShutterPriority = 0x0a,
    IrisPriority = 0x0b,
    GainPriority = 0x0c,
    Bright = 0x0d,
}

pub fn auto_exposure(mode: AutoExposure) -> Operation {
    Operation::command(Category::Camera, [AUTO_EXPOSURE, mode as u8])
}

pub fn auto_exposure_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [AUTO_EXPOSURE], ReplyShape::Byte)
}

/// `true` for automatic slow shutter, `false` for manual.
pub fn slow_shutter(auto: bool) -> Operation {
    Operation::command(Category::Camera, [SLOW_SHUTTER, on_off(auto)])
}

pub fn slow_shutter_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [SLOW_SHUTTER], ReplyShape::Byte)
}

/// Settings stepped up/down/reset with `op 0x`, and set directly with
/// `(op | 0x40) 00 00 0p 0q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Adjustable {
    Aperture = 0x02,
    RedGain = 0x03,
    BlueGain = 0x04,
    Shutter = 0x0a,
    Iris = 0x0b,
    Gain = 0x0c,
    Bright = 0x0d,
    ExposureCompensation = 0x0e,
}

impl Adjustable {
    const DIRECT: u8 = 0x40;

    pub fn up(self) -> Operation {
        Operation::command(Category::Camera, [self as u8, UP])
    }

    pub fn down(self) -> Operation {
        Operation::command(Category::Camera, [self as u8, DOWN])
    }

    pub fn reset(self) -> Operation {
        Operation::command(Category::Camera, [self as u8, RESET])
    }

    pub fn direct(self, value: u8) -> Operation {
        Operation::command(
            Category::Camera,
            with_nibbles(&[self as u8 | Self::DIRECT], value.into()),
        )
    }

    pub fn inquiry(self) -> Operation {
        Operation::inquiry(
            Category::Camera,
            [self as u8 | Self::DIRECT],
            ReplyShape::Nibble16,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum WideMode {
    Off = 0x00,
    Cinema = 0x01,
    Full16By9 = 0x02,
}

pub fn wide_mode(mode: WideMode) -> Operation {
    Operation::command(Category::Camera, [WIDE_MODE, mode as u8])
}

pub fn wide_mode_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [WIDE_MODE], ReplyShape::Byte)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum PictureEffect {
    Off = 0x00,
    Pastel = 0x01,
    Negative = 0x02,
    Sepia = 0x03,
    BlackAndWhite = 0x04,
    Solarize = 0x05,
    Mosaic = 0x06,
    Slim = 0x07,
    Stretch = 0x08,
}

pub fn picture_effect(effect: PictureEffect) -> Operation {
    Operation::command(Category::Camera, [PICTURE_EFFECT, effect as u8])
}

pub fn picture_effect_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [PICTURE_EFFECT], ReplyShape::Byte)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum DigitalEffect {
    Off = 0x00,
    Still = 0x01,
    Flash = 0x02,
    Lumi = 0x03,
    Trail = 0x04,
}

pub fn digital_effect(effect: DigitalEffect) -> Operation {
    Operation::command(Category::Camera, [DIGITAL_EFFECT, effect as u8])
}

pub fn digital_effect_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [DIGITAL_EFFECT], ReplyShape::Byte)
}

pub fn digital_effect_level(level: u8) -> Result<Operation> {
    let level = check_range("digital effect level", level, 0..=0x20)?;
    Ok(Operation::command(
        Category::Camera,
        [DIGITAL_EFFECT_LEVEL, level],
    ))
}

pub fn digital_effect_level_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [DIGITAL_EFFECT_LEVEL], ReplyShape::Byte)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum MemoryAction {
    Reset = 0x00,
    Set = 0x01,
    Recall = 0x02,
}

/// Stores, recalls or clears preset `channel`.
pub fn memory(action: MemoryAction, channel: u8) -> Result<Operation> {
    let channel = check_range("memory channel", channel, 0..=0x0f)?;
    Ok(Operation::command(
        Category::Camera,
        [MEMORY, action as u8, channel],
    ))
}

/// Returns the last recalled preset.
pub fn memory_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [MEMORY], ReplyShape::Byte)
}

pub fn display_toggle() -> Operation {
    Operation::command(Category::Camera, [DISPLAY, TOGGLE])
}

/// Sets the camera's clock. `year` is two digits.
///
/// Each field is sent as two decimal digits, tens first.
pub fn date_time(year: u8, month: u8, day: u8, hour: u8, minute: u8) -> Result<Operation> {
    let fields = [
        check_range("year", year, 0..=99)?,
        check_range("month", month, 1..=12)?,
        check_range("day", day, 1..=31)?,
        check_range("hour", hour, 0..=23)?,
        check_range("minute", minute, 0..=59)?,
    ];

    let mut body = Vec::with_capacity(1 + fields.len() * 2);
    body.push(DATE_TIME_SET);
    for f in fields {
        body.push(f / 10);
        body.push(f % 10);
    }
    Ok(Operation::command(Category::Camera, body))
}

/// Selects a wide conversion lens setting.
pub fn wide_conversion_lens(setting: u8) -> Result<Operation> {
    let setting = check_range("wide conversion lens", setting, 0..=0x0f)?;
    Ok(Operation::command(
        Category::Camera,
        [WIDE_CON_LENS, 0x00, setting],
    ))
}

pub fn wide_conversion_lens_inquiry() -> Operation {
    Operation::inquiry(Category::Camera, [WIDE_CON_LENS], ReplyShape::Byte)
}

pub(super) const CATALOG: &[(&str, Builder)] = &[
    ("zoom_stop", zoom_stop),
    ("zoom_tele", zoom_tele),
    ("zoom_wide", zoom_wide),
    ("zoom_position_inquiry", zoom_position_inquiry),
    ("digital_zoom_on", || digital_zoom(true)),
    ("digital_zoom_off", || digital_zoom(false)),
    ("digital_zoom_inquiry", digital_zoom_inquiry),
    ("focus_stop", focus_stop),
    ("focus_far", focus_far),
    ("focus_near", focus_near),
    ("focus_position_inquiry", focus_position_inquiry),
    ("auto_focus_on", || auto_focus(true)),
    ("auto_focus_off", || auto_focus(false)),
    ("auto_focus_toggle", auto_focus_toggle),
    ("auto_focus_inquiry", auto_focus_inquiry),
    ("focus_one_push", focus_one_push),
    ("focus_infinity", focus_infinity),
    ("focus_auto_sense_inquiry", focus_auto_sense_inquiry),
    ("focus_near_limit_inquiry", focus_near_limit_inquiry),
    ("white_balance_auto", || white_balance(WhiteBalance::Auto)),
    ("white_balance_indoor", || white_balance(WhiteBalance::Indoor)),
    ("white_balance_outdoor", || white_balance(WhiteBalance::Outdoor)),
    ("white_balance_one_push", || white_balance(WhiteBalance::OnePush)),
    ("white_balance_atw", || white_balance(WhiteBalance::Atw)),
    ("white_balance_manual", || white_balance(WhiteBalance::Manual)),
    ("white_balance_trigger", white_balance_trigger),
    ("white_balance_inquiry", white_balance_inquiry),
    ("red_gain_inquiry", || Adjustable::RedGain.inquiry()),
    ("blue_gain_inquiry", || Adjustable::BlueGain.inquiry()),
    ("shutter_inquiry", || Adjustable::Shutter.inquiry()),
    ("iris_inquiry", || Adjustable::Iris.inquiry()),
    ("gain_inquiry", || Adjustable::Gain.inquiry()),
    ("bright_inquiry", || Adjustable::Bright.inquiry()),
    ("exposure_compensation_inquiry", || {
        Adjustable::ExposureCompensation.inquiry()
    }),
    ("aperture_inquiry", || Adjustable::Aperture.inquiry()),
    ("auto_exposure_full_auto", || {
        auto_exposure(AutoExposure::FullAuto)
    }),
    ("auto_exposure_manual", || auto_exposure(AutoExposure::Manual)),
    ("auto_exposure_inquiry", auto_exposure_inquiry),
    ("slow_shutter_inquiry", slow_shutter_inquiry),
    ("exposure_compensation_power_inquiry", exposure_compensation_power_inquiry),
    ("backlight_on", || backlight(true)),
    ("backlight_off", || backlight(false)),
    ("backlight_inquiry", backlight_inquiry),
    ("zero_lux_inquiry", zero_lux_inquiry),
    ("ir_led_inquiry", ir_led_inquiry),
    ("wide_mode_inquiry", wide_mode_inquiry),
    ("mirror_inquiry", mirror_inquiry),
    ("freeze_on", || freeze(true)),
    ("freeze_off", || freeze(false)),
    ("freeze_inquiry", freeze_inquiry),
    ("picture_effect_inquiry", picture_effect_inquiry),
    ("digital_effect_inquiry", digital_effect_inquiry),
    ("digital_effect_level_inquiry", digital_effect_level_inquiry),
    ("memory_inquiry", memory_inquiry),
    ("display_on", || display(true)),
    ("display_off", || display(false)),
    ("display_toggle", display_toggle),
    ("display_inquiry", display_inquiry),
    ("date_display_inquiry", date_display_inquiry),
    ("time_display_inquiry", time_display_inquiry),
    ("wide_conversion_lens_inquiry", wide_conversion_lens_inquiry),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Error, Recipient};

    fn wire(op: Operation) -> Result<Vec<u8>> {
        op.encode(Recipient::Device(1))?.encode()
    }

    #[test]
    fn zoom() -> Result<()> {
        assert_eq!(hex::decode("8101040725ff")?, wire(zoom_tele_speed(5)?)?);
        assert_eq!(hex::decode("8101040737ff")?, wire(zoom_wide_speed(7)?)?);
        assert!(matches!(
            zoom_tele_speed(8),
            Err(Error::ParameterOutOfRange)
        ));
        assert_eq!(hex::decode("8101044700010203ff")?, wire(zoom_direct(0x0123))?);
        assert_eq!(
            hex::decode("810104470001020300000100ff")?,
            wire(zoom_focus_direct(0x0123, 0x0010))?
        );
        Ok(())
    }

    #[test]
    fn focus() -> Result<()> {
        assert_eq!(hex::decode("8101043810ff")?, wire(auto_focus_toggle())?);
        assert_eq!(hex::decode("8101041802ff")?, wire(focus_infinity())?);
        assert_eq!(hex::decode("8101045803ff")?, wire(focus_auto_sense(false))?);
        Ok(())
    }

    #[test]
    fn adjustable() -> Result<()> {
        assert_eq!(hex::decode("8101040302ff")?, wire(Adjustable::RedGain.up())?);
        assert_eq!(hex::decode("8101040b00ff")?, wire(Adjustable::Iris.reset())?);
        assert_eq!(
            hex::decode("8101044c00000a0bff")?,
            wire(Adjustable::Gain.direct(0xab))?
        );
        assert_eq!(
            hex::decode("8109044eff")?,
            wire(Adjustable::ExposureCompensation.inquiry())?
        );
        Ok(())
    }

    #[test]
    fn switches() -> Result<()> {
        assert_eq!(hex::decode("8101043302ff")?, wire(backlight(true))?);
        assert_eq!(hex::decode("81090462ff")?, wire(freeze_inquiry())?);
        Ok(())
    }

    #[test]
    fn memory_presets() -> Result<()> {
        assert_eq!(
            hex::decode("8101043f0203ff")?,
            wire(memory(MemoryAction::Recall, 3)?)?
        );
        assert!(memory(MemoryAction::Set, 0x10).is_err());
        Ok(())
    }

    #[test]
    fn clock() -> Result<()> {
        assert_eq!(
            hex::decode("8101047002040100020901050309ff")?,
            wire(date_time(24, 10, 29, 15, 39)?)?
        );
        assert!(date_time(24, 13, 1, 0, 0).is_err());
        Ok(())
    }
}
