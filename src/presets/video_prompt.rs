//! Bilingual cinematic vocabulary for the video prompt helper.
//!
//! Fourteen categories of shot, lighting, camera and style terms. Every
//! option has a stable key plus an English and a Chinese phrase; selections
//! may be given as any of the three.

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Zh,
    En,
}

impl Language {
    pub const NAMES: [&'static str; 2] = ["zh", "en"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "zh" => Some(Language::Zh),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    /// Separator between phrases inside one sentence.
    pub fn separator(self) -> &'static str {
        match self {
            Language::Zh => "，",
            Language::En => ", ",
        }
    }

    /// Connector between sentences in the detailed format.
    pub fn connector(self) -> &'static str {
        match self {
            Language::Zh => "。",
            Language::En => ". ",
        }
    }

    pub fn none_label(self) -> &'static str {
        match self {
            Language::Zh => "无",
            Language::En => "none",
        }
    }

    pub fn default_prompt(self) -> &'static str {
        match self {
            Language::Zh => "一个美丽的场景",
            Language::En => "A beautiful scene",
        }
    }

    fn professional_suffix(self) -> &'static str {
        match self {
            Language::Zh => "，电影级画质，专业摄影，高细节",
            Language::En => ", cinematic quality, professional cinematography, highly detailed",
        }
    }

    fn detailed_suffix(self) -> &'static str {
        match self {
            Language::Zh => "电影级画质，专业摄影，画面细节丰富",
            Language::En => "Rendered with cinematic quality, professional cinematography and rich detail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptFormat {
    Professional,
    Simple,
    Detailed,
}

impl PromptFormat {
    pub const NAMES: [&'static str; 3] = ["professional", "simple", "detailed"];

    /// Accepts the key or either language's label.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "professional" | "Professional" | "专业" => Some(PromptFormat::Professional),
            "simple" | "Simple" | "简洁" => Some(PromptFormat::Simple),
            "detailed" | "Detailed" | "详细" => Some(PromptFormat::Detailed),
            _ => None,
        }
    }
}

/// Paragraph group a category contributes to in the detailed format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Shot,
    Lighting,
    Camera,
    Style,
}

impl Bucket {
    const ORDER: [Bucket; 4] = [Bucket::Shot, Bucket::Lighting, Bucket::Camera, Bucket::Style];

    fn heading(self, lang: Language) -> &'static str {
        match (self, lang) {
            (Bucket::Shot, Language::Zh) => "镜头构图：",
            (Bucket::Lighting, Language::Zh) => "灯光：",
            (Bucket::Camera, Language::Zh) => "摄像机工作：",
            (Bucket::Style, Language::Zh) => "视觉风格：",
            (Bucket::Shot, Language::En) => "Shot composition: ",
            (Bucket::Lighting, Language::En) => "Lighting: ",
            (Bucket::Camera, Language::En) => "Camera work: ",
            (Bucket::Style, Language::En) => "Visual style: ",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VideoOption {
    pub key: &'static str,
    pub en: &'static str,
    pub zh: &'static str,
}

impl VideoOption {
    pub fn text(&self, lang: Language) -> &'static str {
        match lang {
            Language::Zh => self.zh,
            Language::En => self.en,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VideoCategory {
    pub key: &'static str,
    pub label_en: &'static str,
    pub label_zh: &'static str,
    pub bucket: Bucket,
    pub options: &'static [VideoOption],
}

impl VideoCategory {
    /// Dropdown entries for `lang`, the none entry first.
    pub fn choices(&self, lang: Language) -> Vec<&'static str> {
        std::iter::once(lang.none_label())
            .chain(self.options.iter().map(|o| o.text(lang)))
            .collect()
    }

    /// Map a key or a label in either language back to the option.
    pub fn resolve(&self, value: &str) -> Option<&'static VideoOption> {
        let value = value.trim();
        self.options
            .iter()
            .find(|o| o.key == value || o.en == value || o.zh == value)
    }
}

macro_rules! opts {
    ($(($key:literal, $en:literal, $zh:literal)),* $(,)?) => {
        &[$(VideoOption { key: $key, en: $en, zh: $zh }),*]
    };
}

pub const CATEGORIES: &[VideoCategory] = &[
    VideoCategory {
        key: "shot_size",
        label_en: "Shot Size",
        label_zh: "景别",
        bucket: Bucket::Shot,
        options: opts![
            ("extreme_close_up", "extreme close-up shot", "大特写镜头"),
            ("close_up", "close-up shot", "特写镜头"),
            ("medium_close_up", "medium close-up shot", "中近景镜头"),
            ("medium_shot", "medium shot", "中景镜头"),
            ("full_shot", "full shot", "全景镜头"),
            ("wide_shot", "wide shot", "远景镜头"),
            ("extreme_wide_shot", "extreme wide shot", "大远景镜头"),
        ],
    },
    VideoCategory {
        key: "lighting_type",
        label_en: "Lighting Type",
        label_zh: "光线类型",
        bucket: Bucket::Lighting,
        options: opts![
            ("soft_light", "soft lighting", "柔光"),
            ("hard_light", "hard lighting", "硬光"),
            ("backlight", "backlighting", "逆光"),
            ("side_light", "side lighting", "侧光"),
            ("rim_light", "rim lighting", "轮廓光"),
            ("top_light", "top lighting", "顶光"),
            ("low_key", "low-key lighting", "低调布光"),
            ("high_key", "high-key lighting", "高调布光"),
        ],
    },
    VideoCategory {
        key: "light_source",
        label_en: "Light Source",
        label_zh: "光源",
        bucket: Bucket::Lighting,
        options: opts![
            ("daylight", "natural daylight", "自然日光"),
            ("moonlight", "moonlight", "月光"),
            ("firelight", "firelight", "火光"),
            ("neon", "neon lights", "霓虹灯"),
            ("practical", "practical lamps", "实景灯"),
            ("overcast", "overcast sky light", "阴天散射光"),
        ],
    },
    VideoCategory {
        key: "color_tone",
        label_en: "Color Tone",
        label_zh: "色调",
        bucket: Bucket::Lighting,
        options: opts![
            ("warm", "warm tones", "暖色调"),
            ("cool", "cool tones", "冷色调"),
            ("high_saturation", "highly saturated colors", "高饱和度"),
            ("low_saturation", "desaturated colors", "低饱和度"),
            ("monochrome", "monochrome", "单色"),
            ("teal_orange", "teal and orange grading", "青橙色调"),
        ],
    },
    VideoCategory {
        key: "camera_angle",
        label_en: "Camera Angle",
        label_zh: "拍摄角度",
        bucket: Bucket::Shot,
        options: opts![
            ("eye_level", "eye-level angle", "平视角度"),
            ("low_angle", "low angle", "低角度仰拍"),
            ("high_angle", "high angle", "高角度俯拍"),
            ("birds_eye", "bird's-eye view", "鸟瞰视角"),
            ("dutch_angle", "dutch angle", "荷兰角"),
            ("over_shoulder", "over-the-shoulder shot", "过肩镜头"),
        ],
    },
    VideoCategory {
        key: "lens",
        label_en: "Lens",
        label_zh: "镜头焦段",
        bucket: Bucket::Camera,
        options: opts![
            ("wide_angle", "wide-angle lens", "广角镜头"),
            ("standard", "standard 50mm lens", "50mm标准镜头"),
            ("telephoto", "telephoto lens", "长焦镜头"),
            ("fisheye", "fisheye lens", "鱼眼镜头"),
            ("macro", "macro lens", "微距镜头"),
            ("anamorphic", "anamorphic lens", "变形宽银幕镜头"),
        ],
    },
    VideoCategory {
        key: "camera_movement_basic",
        label_en: "Camera Movement (Basic)",
        label_zh: "基础运镜",
        bucket: Bucket::Camera,
        options: opts![
            ("static", "static camera", "固定镜头"),
            ("pan", "camera pans", "摇镜头"),
            ("tilt", "camera tilts", "俯仰镜头"),
            ("push_in", "camera pushes in", "推镜头"),
            ("pull_out", "camera pulls out", "拉镜头"),
            ("tracking", "tracking shot", "跟拍镜头"),
        ],
    },
    VideoCategory {
        key: "camera_movement_advanced",
        label_en: "Camera Movement (Advanced)",
        label_zh: "高级运镜",
        bucket: Bucket::Camera,
        options: opts![
            ("orbit", "camera orbits the subject", "环绕运镜"),
            ("crane", "crane shot", "升降镜头"),
            ("dolly_zoom", "dolly zoom", "滑动变焦"),
            ("handheld", "handheld camera", "手持摄影"),
            ("drone", "aerial drone shot", "无人机航拍"),
            ("whip_pan", "whip pan", "快速甩镜"),
        ],
    },
    VideoCategory {
        key: "time_of_day",
        label_en: "Time of Day",
        label_zh: "时间",
        bucket: Bucket::Lighting,
        options: opts![
            ("dawn", "at dawn", "黎明"),
            ("morning", "in the morning", "清晨"),
            ("noon", "at noon", "正午"),
            ("golden_hour", "during golden hour", "黄金时刻"),
            ("dusk", "at dusk", "黄昏"),
            ("night", "at night", "夜晚"),
        ],
    },
    VideoCategory {
        key: "motion",
        label_en: "Motion",
        label_zh: "运动",
        bucket: Bucket::Camera,
        options: opts![
            ("slow_motion", "slow motion", "慢动作"),
            ("time_lapse", "time-lapse", "延时摄影"),
            ("fast_motion", "fast motion", "快动作"),
            ("freeze_frame", "freeze frame", "定格"),
            ("smooth_motion", "smooth fluid motion", "流畅运动"),
        ],
    },
    VideoCategory {
        key: "visual_effects",
        label_en: "Visual Effects",
        label_zh: "视觉效果",
        bucket: Bucket::Style,
        options: opts![
            ("lens_flare", "lens flare", "镜头光晕"),
            ("bokeh", "bokeh background", "背景虚化"),
            ("motion_blur", "motion blur", "动态模糊"),
            ("volumetric_light", "volumetric light rays", "体积光"),
            ("fog", "atmospheric fog", "雾气"),
            ("film_grain", "film grain", "胶片颗粒"),
        ],
    },
    VideoCategory {
        key: "stylization_visual_style",
        label_en: "Visual Style",
        label_zh: "风格化",
        bucket: Bucket::Style,
        options: opts![
            ("photorealistic", "photorealistic", "写实风格"),
            ("film_noir", "film noir style", "黑色电影风格"),
            ("cyberpunk", "cyberpunk style", "赛博朋克风格"),
            ("anime", "anime style", "动漫风格"),
            ("documentary", "documentary style", "纪录片风格"),
            ("vintage", "vintage film look", "复古胶片质感"),
        ],
    },
    VideoCategory {
        key: "character_emotion",
        label_en: "Character Emotion",
        label_zh: "人物情绪",
        bucket: Bucket::Style,
        options: opts![
            ("happy", "joyful expression", "开心的表情"),
            ("sad", "sorrowful expression", "悲伤的表情"),
            ("angry", "angry expression", "愤怒的表情"),
            ("calm", "calm expression", "平静的表情"),
            ("surprised", "surprised expression", "惊讶的表情"),
            ("fearful", "fearful expression", "恐惧的表情"),
        ],
    },
    VideoCategory {
        key: "composition",
        label_en: "Composition",
        label_zh: "构图",
        bucket: Bucket::Shot,
        options: opts![
            ("rule_of_thirds", "rule of thirds composition", "三分法构图"),
            ("centered", "centered composition", "中心构图"),
            ("symmetrical", "symmetrical composition", "对称构图"),
            ("leading_lines", "leading lines", "引导线构图"),
            ("frame_in_frame", "frame within a frame", "框中框构图"),
            ("negative_space", "negative space", "留白构图"),
        ],
    },
];

pub fn category(key: &str) -> Option<&'static VideoCategory> {
    CATEGORIES.iter().find(|c| c.key == key)
}

/// Compose the prompt. `selections` maps category keys to a chosen key or
/// label; unknown categories and unresolvable values are skipped.
pub fn generate(
    language: Language,
    user_prompt: &str,
    selections: &IndexMap<String, String>,
    format: PromptFormat,
) -> String {
    let user_prompt = if user_prompt.trim().is_empty() {
        language.default_prompt()
    } else {
        user_prompt
    };

    let selected: Vec<(Bucket, &'static str)> = CATEGORIES
        .iter()
        .filter_map(|cat| {
            let value = selections.get(cat.key)?;
            cat.resolve(value).map(|o| (cat.bucket, o.text(language)))
        })
        .collect();
    log::debug!("Video prompt ({:?}) with {} cinematic elements", language, selected.len());

    let sep = language.separator();
    let phrases: Vec<&str> = selected.iter().map(|(_, t)| *t).collect();
    match format {
        PromptFormat::Professional if phrases.is_empty() => {
            format!("{}{}", user_prompt, language.professional_suffix())
        }
        PromptFormat::Professional => format!(
            "{}{}{}{}",
            user_prompt,
            sep,
            phrases.join(sep),
            language.professional_suffix()
        ),
        PromptFormat::Simple if phrases.is_empty() => user_prompt.to_string(),
        PromptFormat::Simple => {
            let key: Vec<&str> = phrases.iter().take(3).copied().collect();
            format!("{}{}{}", user_prompt, sep, key.join(sep))
        }
        PromptFormat::Detailed => {
            let mut parts = vec![user_prompt.to_string()];
            for bucket in Bucket::ORDER {
                let group: Vec<&str> = selected
                    .iter()
                    .filter(|(b, _)| *b == bucket)
                    .map(|(_, t)| *t)
                    .collect();
                if !group.is_empty() {
                    parts.push(format!("{}{}", bucket.heading(language), group.join(sep)));
                }
            }
            parts.push(language.detailed_suffix().to_string());
            parts.join(language.connector())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picks(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_fourteen_categories_with_unique_keys() {
        assert_eq!(CATEGORIES.len(), 14);
        for cat in CATEGORIES {
            let mut keys: Vec<_> = cat.options.iter().map(|o| o.key).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), cat.options.len(), "{}", cat.key);
            assert_eq!(cat.choices(Language::Zh)[0], "无");
        }
    }

    #[test]
    fn test_professional_english() {
        let sel = picks(&[("shot_size", "close_up"), ("lighting_type", "soft lighting")]);
        let out = generate(Language::En, "A cat", &sel, PromptFormat::Professional);
        assert_eq!(
            out,
            "A cat, close-up shot, soft lighting, cinematic quality, professional cinematography, highly detailed"
        );
    }

    #[test]
    fn test_chinese_labels_resolve() {
        let sel = picks(&[("shot_size", "特写镜头"), ("motion", "slow_motion")]);
        let out = generate(Language::Zh, "一只猫", &sel, PromptFormat::Simple);
        assert_eq!(out, "一只猫，特写镜头，慢动作");
    }

    #[test]
    fn test_simple_keeps_three() {
        let sel = picks(&[
            ("shot_size", "close_up"),
            ("lighting_type", "backlight"),
            ("light_source", "neon"),
            ("color_tone", "warm"),
        ]);
        let out = generate(Language::En, "x", &sel, PromptFormat::Simple);
        assert_eq!(out, "x, close-up shot, backlighting, neon lights");
    }

    #[test]
    fn test_detailed_groups_buckets() {
        let sel = picks(&[("composition", "centered"), ("lens", "macro"), ("shot_size", "wide_shot")]);
        let out = generate(Language::En, "A city", &sel, PromptFormat::Detailed);
        assert_eq!(
            out,
            "A city. Shot composition: wide shot, centered composition. Camera work: macro lens. \
             Rendered with cinematic quality, professional cinematography and rich detail"
        );
    }

    #[test]
    fn test_none_and_unknown_skipped() {
        let sel = picks(&[("shot_size", "none"), ("bogus", "close_up"), ("lens", "nope")]);
        assert_eq!(generate(Language::En, "", &sel, PromptFormat::Simple), "A beautiful scene");
    }
}
