//! ES5 methods that must call back into interpreted code (callbacks,
//! comparators, replacement functions) are installed as interpreted source
//! run once at startup, so re-entry costs nothing special. Everything lands
//! through `Object.defineProperty` to stay out of for-in enumeration.

pub(crate) const SOURCES: &[&str] = &[
    OBJECT_POLYFILL,
    FUNCTION_POLYFILL,
    ARRAY_POLYFILL,
    STRING_POLYFILL,
];

const OBJECT_POLYFILL: &str = r#"
Object.defineProperty(Object, 'defineProperties', {configurable: true, writable: true, value:
  function(obj, props) {
    var keys = Object.keys(props);
    for (var i = 0; i < keys.length; i++) {
      Object.defineProperty(obj, keys[i], props[keys[i]]);
    }
    return obj;
  }
});
(function() {
  var create_ = Object.create;
  Object.defineProperty(Object, 'create', {configurable: true, writable: true, value:
    function(proto, props) {
      var obj = create_(proto);
      if (props !== undefined) {
        Object.defineProperties(obj, props);
      }
      return obj;
    }
  });
})();
"#;

const FUNCTION_POLYFILL: &str = r#"
Object.defineProperty(Function.prototype, 'bind', {configurable: true, writable: true, value:
  function(thisArg) {
    if (typeof this !== 'function') {
      throw new TypeError('Bind must be called on a function');
    }
    var target = this;
    var boundArgs = Array.prototype.slice.call(arguments, 1);
    return function() {
      var args = boundArgs.concat(Array.prototype.slice.call(arguments));
      return target.apply(thisArg, args);
    };
  }
});
"#;

const ARRAY_POLYFILL: &str = r#"
Object.defineProperty(Array.prototype, 'forEach', {configurable: true, writable: true, value:
  function(callback, thisArg) {
    if (this == null) {
      throw new TypeError('Array.prototype.forEach called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in obj) {
        callback.call(thisArg, obj[i], i, obj);
      }
    }
  }
});

Object.defineProperty(Array.prototype, 'map', {configurable: true, writable: true, value:
  function(callback, thisArg) {
    if (this == null) {
      throw new TypeError('Array.prototype.map called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    var out = new Array(len);
    for (var i = 0; i < len; i++) {
      if (i in obj) {
        out[i] = callback.call(thisArg, obj[i], i, obj);
      }
    }
    return out;
  }
});

Object.defineProperty(Array.prototype, 'filter', {configurable: true, writable: true, value:
  function(callback, thisArg) {
    if (this == null) {
      throw new TypeError('Array.prototype.filter called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    var out = [];
    for (var i = 0; i < len; i++) {
      if (i in obj && callback.call(thisArg, obj[i], i, obj)) {
        out.push(obj[i]);
      }
    }
    return out;
  }
});

Object.defineProperty(Array.prototype, 'some', {configurable: true, writable: true, value:
  function(callback, thisArg) {
    if (this == null) {
      throw new TypeError('Array.prototype.some called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in obj && callback.call(thisArg, obj[i], i, obj)) {
        return true;
      }
    }
    return false;
  }
});

Object.defineProperty(Array.prototype, 'every', {configurable: true, writable: true, value:
  function(callback, thisArg) {
    if (this == null) {
      throw new TypeError('Array.prototype.every called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in obj && !callback.call(thisArg, obj[i], i, obj)) {
        return false;
      }
    }
    return true;
  }
});

Object.defineProperty(Array.prototype, 'reduce', {configurable: true, writable: true, value:
  function(callback, initialValue) {
    if (this == null) {
      throw new TypeError('Array.prototype.reduce called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var len = obj.length >>> 0;
    var i = 0;
    var acc;
    if (arguments.length > 1) {
      acc = initialValue;
    } else {
      while (i < len && !(i in obj)) {
        i++;
      }
      if (i >= len) {
        throw new TypeError('Reduce of empty array with no initial value');
      }
      acc = obj[i++];
    }
    for (; i < len; i++) {
      if (i in obj) {
        acc = callback(acc, obj[i], i, obj);
      }
    }
    return acc;
  }
});

Object.defineProperty(Array.prototype, 'reduceRight', {configurable: true, writable: true, value:
  function(callback, initialValue) {
    if (this == null) {
      throw new TypeError('Array.prototype.reduceRight called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var obj = Object(this);
    var i = (obj.length >>> 0) - 1;
    var acc;
    if (arguments.length > 1) {
      acc = initialValue;
    } else {
      while (i >= 0 && !(i in obj)) {
        i--;
      }
      if (i < 0) {
        throw new TypeError('Reduce of empty array with no initial value');
      }
      acc = obj[i--];
    }
    for (; i >= 0; i--) {
      if (i in obj) {
        acc = callback(acc, obj[i], i, obj);
      }
    }
    return acc;
  }
});

Object.defineProperty(Array.prototype, 'indexOf', {configurable: true, writable: true, value:
  function(search, fromIndex) {
    var len = this.length >>> 0;
    var from = Number(fromIndex) || 0;
    from = from < 0 ? Math.ceil(from) : Math.floor(from);
    if (from < 0) {
      from += len;
      if (from < 0) {
        from = 0;
      }
    }
    for (; from < len; from++) {
      if (from in this && this[from] === search) {
        return from;
      }
    }
    return -1;
  }
});

Object.defineProperty(Array.prototype, 'lastIndexOf', {configurable: true, writable: true, value:
  function(search, fromIndex) {
    var len = this.length >>> 0;
    var from = len - 1;
    if (arguments.length > 1) {
      from = Number(fromIndex) || 0;
      from = from < 0 ? Math.ceil(from) : Math.floor(from);
      if (from < 0) {
        from += len;
      } else if (from > len - 1) {
        from = len - 1;
      }
    }
    for (; from >= 0; from--) {
      if (from in this && this[from] === search) {
        return from;
      }
    }
    return -1;
  }
});

Object.defineProperty(Array.prototype, 'sort', {configurable: true, writable: true, value:
  function(comparator) {
    var len = this.length >>> 0;
    for (var i = 0; i < len; i++) {
      var swapped = false;
      for (var j = 0; j < len - i - 1; j++) {
        var a = this[j];
        var b = this[j + 1];
        var swap;
        if (a === undefined) {
          swap = b !== undefined;
        } else if (b === undefined) {
          swap = false;
        } else if (comparator) {
          swap = comparator(a, b) > 0;
        } else {
          swap = String(a) > String(b);
        }
        if (swap) {
          this[j] = b;
          this[j + 1] = a;
          swapped = true;
        }
      }
      if (!swapped) {
        break;
      }
    }
    return this;
  }
});

Object.defineProperty(Array.prototype, 'toLocaleString', {configurable: true, writable: true, value:
  function() {
    var out = [];
    for (var i = 0; i < this.length; i++) {
      var item = this[i];
      out[i] = (item === null || item === undefined) ? '' : item.toLocaleString();
    }
    return out.join(',');
  }
});
"#;

const STRING_POLYFILL: &str = r#"
Object.defineProperty(RegExp.prototype, 'test', {configurable: true, writable: true, value:
  function(value) {
    return this.exec(value) !== null;
  }
});

(function() {
  var nativeReplace = String.prototype.replace;
  Object.defineProperty(String.prototype, 'replace', {configurable: true, writable: true, value:
    function(pattern, replacement) {
      if (typeof replacement !== 'function') {
        return nativeReplace.call(this, pattern, replacement);
      }
      var subject = String(this);
      if (!(pattern instanceof RegExp)) {
        var needle = String(pattern);
        var at = subject.indexOf(needle);
        if (at === -1) {
          return subject;
        }
        var piece = replacement(needle, at, subject);
        return subject.substring(0, at) + piece + subject.substring(at + needle.length);
      }
      var out = '';
      var position = 0;
      var match;
      pattern.lastIndex = 0;
      while ((match = pattern.exec(subject)) !== null) {
        var args = [];
        for (var i = 0; i < match.length; i++) {
          args.push(match[i]);
        }
        args.push(match.index, subject);
        out += subject.substring(position, match.index) + replacement.apply(undefined, args);
        position = match.index + match[0].length;
        if (!pattern.global) {
          break;
        }
        if (match[0] === '') {
          pattern.lastIndex++;
        }
      }
      return out + subject.substring(position);
    }
  });
})();
"#;
