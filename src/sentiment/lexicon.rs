//! Word lists for comment scoring.
//!
//! Weights follow the AFINN convention, trimmed to -3..=3 and to vocabulary
//! that actually shows up in video comment sections.

pub(super) const POSITIVE: &[(&str, i32)] = &[
    ("amazing", 3),
    ("awesome", 3),
    ("beautiful", 3),
    ("best", 3),
    ("brilliant", 3),
    ("excellent", 3),
    ("fantastic", 3),
    ("incredible", 3),
    ("love", 3),
    ("loved", 3),
    ("loving", 3),
    ("masterpiece", 3),
    ("outstanding", 3),
    ("perfect", 3),
    ("superb", 3),
    ("wonderful", 3),
    ("epic", 2),
    ("fun", 2),
    ("funny", 2),
    ("glad", 2),
    ("good", 2),
    ("great", 2),
    ("happy", 2),
    ("helpful", 2),
    ("hilarious", 2),
    ("impressive", 2),
    ("informative", 2),
    ("inspiring", 2),
    ("legend", 2),
    ("lovely", 2),
    ("nice", 2),
    ("recommend", 2),
    ("talented", 2),
    ("thank", 2),
    ("thanks", 2),
    ("useful", 2),
    ("enjoy", 2),
    ("enjoyed", 2),
    ("agree", 1),
    ("clear", 1),
    ("cool", 1),
    ("cute", 1),
    ("fine", 1),
    ("interesting", 1),
    ("like", 1),
    ("liked", 1),
    ("solid", 1),
    ("subscribed", 1),
    ("wow", 1),
    ("yes", 1),
];

pub(super) const NEGATIVE: &[(&str, i32)] = &[
    ("awful", -3),
    ("disgusting", -3),
    ("garbage", -3),
    ("hate", -3),
    ("hated", -3),
    ("horrible", -3),
    ("pathetic", -3),
    ("terrible", -3),
    ("trash", -3),
    ("worst", -3),
    ("annoying", -2),
    ("bad", -2),
    ("boring", -2),
    ("clickbait", -2),
    ("cringe", -2),
    ("disappointed", -2),
    ("disappointing", -2),
    ("dislike", -2),
    ("fake", -2),
    ("misleading", -2),
    ("poor", -2),
    ("sad", -2),
    ("scam", -2),
    ("stupid", -2),
    ("ugly", -2),
    ("useless", -2),
    ("waste", -2),
    ("wrong", -2),
    ("confusing", -1),
    ("meh", -1),
    ("mediocre", -1),
    ("slow", -1),
    ("unfortunately", -1),
    ("weird", -1),
];

/// Words that flip the sign of the scored word right after them.
pub(super) const NEGATORS: &[&str] = &[
    "not", "no", "never", "dont", "don't", "didnt", "didn't", "isnt", "isn't", "wasnt",
    "wasn't", "cant", "can't", "wont", "won't", "nothing", "hardly",
];
