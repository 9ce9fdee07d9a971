use indexmap::IndexMap;

use super::{Biography, Dataset, Event, Place, Source};

const DEFAULT_PERSON_IMAGE: &str = "persons/default.png";
const DEFAULT_PLACE_IMAGE: &str = "maps/example.png";

/// First-run dataset, also the fallback when the local snapshot is unreadable.
pub fn default_dataset() -> Dataset {
    let events = vec![
        Event {
            id: "badr".into(),
            title: "غزوة بدر الكبرى".into(),
            year: Some(2),
            order: Some(1),
            tags: vec!["غزوات".into(), "بدر".into(), "السنة الثانية".into()],
            notes: "يستحسن إضافة تفاصيل عن الأسرى وتقسيم الغنائم.".into(),
            sources: vec![
                Source::new(
                    "ابن كثير",
                    None,
                    "وقعت غزوة بدر في السابع عشر من رمضان من السنة الثانية للهجرة، وخرج النبي صلى الله عليه وسلم وأصحابه لاعتراض قافلة قريش، ثم دار القتال عند ماء بدر فكان النصر للمسلمين.",
                ),
                Source::new(
                    "الذهبي",
                    None,
                    "يقول الذهبي إن بدرًا كانت أول المعارك الفاصلة، وأن الله أيد فيها رسوله بالملائكة، فاستبشر المسلمون وانهزمت قريش.",
                ),
            ],
        },
        Event {
            id: "uhud".into(),
            title: "غزوة أحد".into(),
            year: Some(3),
            order: Some(1),
            tags: vec!["غزوات".into(), "أحد".into(), "السنة الثالثة".into()],
            notes: "يمكن توثيق استشهاد حمزة بن عبد المطلب وموقف الرماة.".into(),
            sources: vec![Source::new(
                "ابن هشام",
                None,
                "خرج رسول الله صلى الله عليه وسلم لمواجهة قريش عند جبل أحد، فبدأ النصر للمسلمين ثم تغير بعد مخالفة الرماة لأمر النبي.",
            )],
        },
    ];

    let mut biographies = IndexMap::new();
    biographies.insert(
        "محمد بن عبد الله".to_string(),
        person(
            "رسول الله صلى الله عليه وسلم وخاتم الأنبياء.",
            "بعث في مكة ثم هاجر إلى المدينة وأسس دولة الإسلام حتى وفاته سنة 11 هـ.",
        ),
    );
    biographies.insert(
        "حمزة بن عبد المطلب".to_string(),
        person(
            "أسد الله وأسد رسوله، استشهد في غزوة أحد.",
            "هو حمزة بن عبد المطلب الهاشمي القرشي، عم رسول الله صلى الله عليه وسلم وأخوه من الرضاعة، أسلم في مكة وشهد بدرًا وأُحدًا واستشهد هناك.",
        ),
    );
    biographies.insert(
        "مصعب بن عمير".to_string(),
        person(
            "أول سفير في الإسلام وحامل لواء أحد.",
            "بعثه النبي صلى الله عليه وسلم داعية إلى المدينة واستشهد وهو يحمل اللواء يوم أحد.",
        ),
    );

    let mut places = IndexMap::new();
    places.insert(
        "بدر".to_string(),
        Place {
            desc: "وادي يقع بين مكة والمدينة شهد أول انتصار حاسم للمسلمين.".into(),
            image: "maps/badr.png".into(),
        },
    );
    places.insert(
        "أحد".to_string(),
        Place {
            desc: "جبل شمال المدينة المنورة وقع عنده القتال في السنة الثالثة.".into(),
            image: DEFAULT_PLACE_IMAGE.into(),
        },
    );
    places.insert(
        "اليرموك".to_string(),
        Place {
            desc: "سهل واسع جنوب غرب دمشق دارت فيه معركة اليرموك ضد الروم.".into(),
            image: DEFAULT_PLACE_IMAGE.into(),
        },
    );

    Dataset {
        events,
        biographies,
        places,
    }
}

fn person(short: &str, full: &str) -> Biography {
    Biography {
        short: short.into(),
        full: full.into(),
        img: DEFAULT_PERSON_IMAGE.into(),
    }
}
